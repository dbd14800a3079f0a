use serde::{Deserialize, Serialize};

use crate::error::CleanupError;
use crate::model::RESERVED_LABELS;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Cleanup configuration, usually loaded from `cleanup.toml`.
///
/// Every section is optional; missing sections fall back to the calibrated
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub store: StoreConfig,
    pub export: ExportConfig,
    pub urls: UrlConfig,
    pub dedup: DedupConfig,
    pub classify: ClassifyConfig,
}

// ---------------------------------------------------------------------------
// Store + Export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "agencies.db".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Snapshot rewritten after a run that changed the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// URL repair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UrlConfig {
    /// TLDs accepted for bare domains found inside free text.
    pub known_tlds: Vec<String>,
    /// Email domains that never point at an agency's own site.
    pub ignored_email_domains: Vec<String>,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            known_tlds: strings(&["com", "pl", "es", "eu", "net", "org", "biz", "info"]),
            ignored_email_domains: strings(&[
                "gmail.com",
                "hotmail.com",
                "outlook.com",
                "yahoo.com",
                "icloud.com",
                "wp.pl",
                "o2.pl",
                "onet.pl",
                "interia.pl",
                "gmx.com",
            ]),
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicate reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub key: KeyMode,
}

/// What makes two records the same agency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    /// Normalized name only.
    #[default]
    Name,
    /// Normalized name plus website host (without `www.`).
    NameAndDomain,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Minimum score an indicator set needs before it can win.
    pub threshold: f64,
    /// Two qualifying sets closer than this are a dual-region record.
    pub margin: f64,
    pub weights: SignalWeights,
    pub regions: Vec<IndicatorSet>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            margin: 1.0,
            weights: SignalWeights::default(),
            regions: vec![IndicatorSet::marbella(), IndicatorSet::polish()],
        }
    }
}

/// Per-signal weights. Phone and domain are strong; token hits are weak and
/// counted once per distinct token.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalWeights {
    pub phone: f64,
    pub domain: f64,
    pub address: f64,
    pub description: f64,
    pub name: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            phone: 3.0,
            domain: 3.0,
            address: 1.0,
            description: 0.5,
            name: 0.5,
        }
    }
}

/// Signals that point at one region. All matching is case-insensitive.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndicatorSet {
    pub label: String,
    #[serde(default)]
    pub phone_prefixes: Vec<String>,
    #[serde(default)]
    pub domain_suffixes: Vec<String>,
    #[serde(default)]
    pub domain_keywords: Vec<String>,
    #[serde(default)]
    pub address_tokens: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub name_tokens: Vec<String>,
}

impl IndicatorSet {
    /// Costa del Sol / Spain.
    pub fn marbella() -> Self {
        Self {
            label: "marbella".into(),
            phone_prefixes: strings(&["+34", "0034", "34"]),
            domain_suffixes: strings(&[".es"]),
            domain_keywords: strings(&["marbella", "costadelsol", "costa-del-sol", "malaga", "andalusia"]),
            address_tokens: strings(&[
                "marbella",
                "malaga",
                "málaga",
                "andalusia",
                "costa del sol",
                "costa blanca",
                "alicante",
                "valencia",
                "barcelona",
                "madrid",
                "spain",
                "españa",
                "puerto banus",
                "estepona",
                "san pedro",
                "fuengirola",
                "torremolinos",
                "benalmadena",
                "mijas",
            ]),
            keywords: strings(&[
                "spain",
                "españa",
                "spanish",
                "marbella",
                "costa del sol",
                "andalusia",
                "malaga",
                "puerto banus",
                "español",
                "española",
                "hiszpania",
            ]),
            name_tokens: strings(&["marbella", "spain", "inmobiliaria", "costa"]),
        }
    }

    /// Poland.
    pub fn polish() -> Self {
        Self {
            label: "polish".into(),
            phone_prefixes: strings(&["+48", "0048", "48"]),
            domain_suffixes: strings(&[".pl"]),
            domain_keywords: strings(&["poland", "polska"]),
            address_tokens: strings(&[
                "poland",
                "polska",
                "warsaw",
                "warszawa",
                "krakow",
                "kraków",
                "lodz",
                "łódź",
                "wroclaw",
                "wrocław",
                "poznan",
                "poznań",
                "gdansk",
                "gdańsk",
                "szczecin",
                "bydgoszcz",
                "lublin",
                "katowice",
                "bialystok",
                "białystok",
                "gdynia",
                "czestochowa",
                "częstochowa",
                "radom",
                "torun",
                "toruń",
                "kielce",
                "rzeszow",
                "rzeszów",
                "gliwice",
                "olsztyn",
                "opole",
                "sopot",
            ]),
            keywords: strings(&[
                "poland",
                "polska",
                "polish",
                "polski",
                "warszawa",
                "kraków",
                "łódź",
                "wrocław",
                "poznań",
                "gdańsk",
                "polacy",
                "polak",
                "polka",
            ]),
            name_tokens: strings(&["polska", "polish", "nieruchomości", "nieruchomosci"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CleanupConfig {
    pub fn from_toml(input: &str) -> Result<Self, CleanupError> {
        let config: CleanupConfig =
            toml::from_str(input).map_err(|e| CleanupError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, CleanupError> {
        toml::to_string_pretty(self).map_err(|e| CleanupError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CleanupError> {
        let c = &self.classify;

        if !(c.threshold > 0.0) {
            return Err(CleanupError::ConfigValidation(format!(
                "classify.threshold must be positive, got {}",
                c.threshold
            )));
        }
        if c.margin < 0.0 {
            return Err(CleanupError::ConfigValidation(format!(
                "classify.margin must not be negative, got {}",
                c.margin
            )));
        }

        let w = &c.weights;
        for (name, value) in [
            ("phone", w.phone),
            ("domain", w.domain),
            ("address", w.address),
            ("description", w.description),
            ("name", w.name),
        ] {
            if value < 0.0 || value.is_nan() {
                return Err(CleanupError::ConfigValidation(format!(
                    "classify.weights.{name} must not be negative, got {value}"
                )));
            }
        }

        if c.regions.is_empty() {
            return Err(CleanupError::ConfigValidation(
                "at least one [[classify.regions]] entry is required".into(),
            ));
        }

        let mut seen: Vec<String> = Vec::new();
        for region in &c.regions {
            let label = region.label.trim().to_lowercase();
            if label.is_empty() {
                return Err(CleanupError::ConfigValidation("region label must not be empty".into()));
            }
            if RESERVED_LABELS.contains(&label.as_str()) {
                return Err(CleanupError::ConfigValidation(format!(
                    "region label '{}' is reserved",
                    region.label
                )));
            }
            if seen.contains(&label) {
                return Err(CleanupError::ConfigValidation(format!(
                    "duplicate region label '{}'",
                    region.label
                )));
            }
            seen.push(label);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
