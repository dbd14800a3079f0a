// JSON snapshot export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use agency_cleanup::model::AgencyRecord;
use agency_cleanup::store::RecordStore;
use agency_cleanup::CleanupError;

/// Write records as a pretty-printed JSON array of flat objects, ordered by id.
pub fn write_snapshot<W: Write>(records: &[AgencyRecord], writer: W) -> Result<(), CleanupError> {
    let mut sorted: Vec<&AgencyRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.id);
    serde_json::to_writer_pretty(writer, &sorted).map_err(|e| CleanupError::Io(e.to_string()))
}

/// Dump the main table to `path`. Returns the number of records written.
pub fn export<S: RecordStore + ?Sized>(store: &S, path: &Path) -> Result<usize, CleanupError> {
    let records = store.fetch_all()?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_snapshot(&records, &mut writer)?;
    writer.flush()?;
    log::info!("snapshot: {} record(s) -> {}", records.len(), path.display());
    Ok(records.len())
}
