use crate::model::{AgencyRecord, Field, ProcessingStatus};

/// A record with no way to reach the agency (no website and no phone) is not
/// worth keeping in the main table.
///
/// A blank name alone does not qualify: a nameless record that still carries
/// a phone or website stays, so the contact data is not lost.
pub fn should_archive(record: &AgencyRecord) -> bool {
    !record.has(Field::Website) && !record.has(Field::Phone)
}

/// Split records into (kept, archived). Archived records carry
/// `ProcessingStatus::Archived`; kept records are returned untouched.
pub fn partition(records: Vec<AgencyRecord>) -> (Vec<AgencyRecord>, Vec<AgencyRecord>) {
    let mut kept = Vec::with_capacity(records.len());
    let mut archived = Vec::new();

    for mut record in records {
        if should_archive(&record) {
            log::debug!("archive #{} '{}'", record.id, record.name);
            record.status = ProcessingStatus::Archived;
            archived.push(record);
        } else {
            kept.push(record);
        }
    }

    (kept, archived)
}
