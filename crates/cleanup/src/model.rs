use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One row of the agency table.
///
/// Optional text fields use the empty string for "absent"; the store reads
/// NULL columns as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgencyRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub website: String,
    pub phone: String,
    pub address: String,
    pub description: String,
    pub additional_info: String,
    #[serde(rename = "processing_status")]
    pub status: ProcessingStatus,
}

impl AgencyRecord {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Website => &self.website,
            Field::Phone => &self.phone,
            Field::Address => &self.address,
            Field::Description => &self.description,
        }
    }

    pub fn field_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Website => &mut self.website,
            Field::Phone => &mut self.phone,
            Field::Address => &mut self.address,
            Field::Description => &mut self.description,
        }
    }

    /// True if the informative field holds something other than whitespace.
    pub fn has(&self, field: Field) -> bool {
        !is_blank(self.field(field))
    }

    /// Informative fields that are populated.
    pub fn populated_fields(&self) -> Vec<Field> {
        Field::ALL.iter().copied().filter(|f| self.has(*f)).collect()
    }
}

pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// The informative fields used for completeness scoring and merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Website,
    Phone,
    Address,
    Description,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Website, Field::Phone, Field::Address, Field::Description];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Website => write!(f, "website"),
            Self::Phone => write!(f, "phone"),
            Self::Address => write!(f, "address"),
            Self::Description => write!(f, "description"),
        }
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Derived region category, stored in the `type` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[default]
    Unclassified,
    /// One indicator set won; holds that set's label.
    Region(String),
    DualRegion,
    InsufficientData,
}

pub const LABEL_UNCLASSIFIED: &str = "unclassified";
pub const LABEL_DUAL_REGION: &str = "dual_region";
pub const LABEL_INSUFFICIENT_DATA: &str = "insufficient_data";

/// Labels a configured indicator set may not use.
pub const RESERVED_LABELS: [&str; 3] = [LABEL_UNCLASSIFIED, LABEL_DUAL_REGION, LABEL_INSUFFICIENT_DATA];

impl Category {
    /// Parse a stored label. Older tools wrote several spellings for the
    /// dual category and `gemini_discovered` for "not yet classified".
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.to_lowercase().as_str() {
            "" | LABEL_UNCLASSIFIED | "gemini_discovered" => Self::Unclassified,
            LABEL_DUAL_REGION | "both" | "spain&poland" | "spain and poland" => Self::DualRegion,
            LABEL_INSUFFICIENT_DATA => Self::InsufficientData,
            _ => Self::Region(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Unclassified => LABEL_UNCLASSIFIED,
            Self::Region(label) => label,
            Self::DualRegion => LABEL_DUAL_REGION,
            Self::InsufficientData => LABEL_INSUFFICIENT_DATA,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

// ---------------------------------------------------------------------------
// Processing status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Cleaned,
    Archived,
}

impl ProcessingStatus {
    /// Parse the stored status column. NULL/empty and unknown values count
    /// as pending so they get picked up by the next run.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "cleaned" => Self::Cleaned,
            "archived" => Self::Archived,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cleaned => "cleaned",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Change set
// ---------------------------------------------------------------------------

/// Everything a pipeline step wants written back. The store applies it as a
/// single transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Records rewritten in place (fields and status).
    pub updates: Vec<AgencyRecord>,
    /// Ids removed from the main table for good (duplicate losers).
    pub deletions: Vec<i64>,
    /// Records relocated to the archive table.
    pub archived: Vec<AgencyRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletions.is_empty() && self.archived.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// A discovered agency not yet in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewAgency {
    pub name: String,
    pub website: String,
    pub phone: String,
    pub address: String,
    pub description: String,
    pub additional_info: String,
}
