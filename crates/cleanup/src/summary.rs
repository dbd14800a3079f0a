use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CleanupError;
use crate::model::AgencyRecord;
use crate::store::RecordStore;

/// Row counts for the main and archive tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSummary {
    pub total: usize,
    pub archived: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
}

pub fn summarize(records: &[AgencyRecord], archived: usize) -> StoreSummary {
    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();

    for r in records {
        *by_category.entry(r.category.to_string()).or_insert(0) += 1;
        *by_status.entry(r.status.to_string()).or_insert(0) += 1;
    }

    StoreSummary {
        total: records.len(),
        archived,
        by_category,
        by_status,
    }
}

pub fn summarize_store<S: RecordStore + ?Sized>(store: &S) -> Result<StoreSummary, CleanupError> {
    let records = store.fetch_all()?;
    let archived = store.fetch_archived()?.len();
    Ok(summarize(&records, archived))
}

impl StoreSummary {
    /// Category breakdown, largest first.
    pub fn categories_by_count(&self) -> Vec<(&str, usize)> {
        let mut rows: Vec<(&str, usize)> = self.by_category.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        rows
    }
}
