use std::collections::BTreeMap;

use crate::error::CleanupError;
use crate::model::{AgencyRecord, ChangeSet, NewAgency, ProcessingStatus};

/// Persistence boundary for the cleanup engine.
///
/// Callers serialize access; implementations do not lock against concurrent
/// writers. `apply` must be all-or-nothing: on error no part of the change
/// set may be visible.
pub trait RecordStore {
    /// Main-table records whose status is `pending`, ordered by id.
    fn fetch_pending(&self) -> Result<Vec<AgencyRecord>, CleanupError>;

    /// Every main-table record, ordered by id.
    fn fetch_all(&self) -> Result<Vec<AgencyRecord>, CleanupError>;

    /// Every archived record, ordered by id.
    fn fetch_archived(&self) -> Result<Vec<AgencyRecord>, CleanupError>;

    fn update_record(&mut self, record: &AgencyRecord) -> Result<(), CleanupError>;

    fn delete_record(&mut self, id: i64) -> Result<(), CleanupError>;

    /// Copy a record into the archive table. Does not touch the main table.
    fn insert_into_archive(&mut self, record: &AgencyRecord) -> Result<(), CleanupError>;

    /// Add a discovered agency as a pending record. Returns the new id.
    fn insert_new(&mut self, agency: &NewAgency) -> Result<i64, CleanupError>;

    /// Apply updates, deletions and archive relocations atomically.
    fn apply(&mut self, changes: &ChangeSet) -> Result<(), CleanupError>;
}

/// Apply a change set through the single-record operations. Callers provide
/// atomicity (a transaction, or a scratch copy).
pub fn apply_each<S: RecordStore + ?Sized>(store: &mut S, changes: &ChangeSet) -> Result<(), CleanupError> {
    for record in &changes.updates {
        store.update_record(record)?;
    }
    for id in &changes.deletions {
        store.delete_record(*id)?;
    }
    for record in &changes.archived {
        store.insert_into_archive(record)?;
        store.delete_record(record.id)?;
    }
    Ok(())
}

/// In-memory store. Used by tests and dry runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    records: BTreeMap<i64, AgencyRecord>,
    archive: BTreeMap<i64, AgencyRecord>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records, keeping their ids.
    pub fn with_records(records: impl IntoIterator<Item = AgencyRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.next_id = store.next_id.max(record.id);
            store.records.insert(record.id, record);
        }
        store
    }

    pub fn get(&self, id: i64) -> Option<&AgencyRecord> {
        self.records.get(&id)
    }
}

impl RecordStore for MemoryStore {
    fn fetch_pending(&self) -> Result<Vec<AgencyRecord>, CleanupError> {
        Ok(self
            .records
            .values()
            .filter(|r| r.status == ProcessingStatus::Pending)
            .cloned()
            .collect())
    }

    fn fetch_all(&self) -> Result<Vec<AgencyRecord>, CleanupError> {
        Ok(self.records.values().cloned().collect())
    }

    fn fetch_archived(&self) -> Result<Vec<AgencyRecord>, CleanupError> {
        Ok(self.archive.values().cloned().collect())
    }

    fn update_record(&mut self, record: &AgencyRecord) -> Result<(), CleanupError> {
        match self.records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(CleanupError::Storage(format!("no record #{}", record.id))),
        }
    }

    fn delete_record(&mut self, id: i64) -> Result<(), CleanupError> {
        self.records.remove(&id);
        Ok(())
    }

    fn insert_into_archive(&mut self, record: &AgencyRecord) -> Result<(), CleanupError> {
        if self.archive.contains_key(&record.id) {
            return Err(CleanupError::Storage(format!("record #{} is already archived", record.id)));
        }
        let mut copy = record.clone();
        copy.status = ProcessingStatus::Archived;
        self.archive.insert(copy.id, copy);
        Ok(())
    }

    fn insert_new(&mut self, agency: &NewAgency) -> Result<i64, CleanupError> {
        self.next_id += 1;
        let id = self.next_id;
        self.records.insert(
            id,
            AgencyRecord {
                id,
                name: agency.name.clone(),
                website: agency.website.clone(),
                phone: agency.phone.clone(),
                address: agency.address.clone(),
                description: agency.description.clone(),
                additional_info: agency.additional_info.clone(),
                ..AgencyRecord::default()
            },
        );
        Ok(id)
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<(), CleanupError> {
        let mut scratch = self.clone();
        apply_each(&mut scratch, changes)?;
        *self = scratch;
        Ok(())
    }
}
