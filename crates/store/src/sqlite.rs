// Agency store over SQLite

use std::path::Path;

use rusqlite::{params, Connection, Row};

use agency_cleanup::model::{AgencyRecord, Category, ChangeSet, NewAgency, ProcessingStatus};
use agency_cleanup::store::RecordStore;
use agency_cleanup::CleanupError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT '',
    type TEXT,                    -- region label, dual_region, insufficient_data, unclassified
    website TEXT,
    phone TEXT,
    address TEXT,
    description TEXT,
    additional_info TEXT,
    cleanup_status TEXT DEFAULT 'pending'   -- pending, cleaned, archived
);

CREATE TABLE IF NOT EXISTS undefined (
    id INTEGER PRIMARY KEY,       -- id carried over from agencies
    name TEXT NOT NULL DEFAULT '',
    type TEXT,
    website TEXT,
    phone TEXT,
    address TEXT,
    description TEXT,
    additional_info TEXT,
    cleanup_status TEXT DEFAULT 'archived'
);
"#;

const COLUMNS: &str = "id, name, type, website, phone, address, description, additional_info, cleanup_status";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure both tables exist.
    pub fn open(path: &Path) -> Result<Self, CleanupError> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CleanupError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CleanupError> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        migrate(&conn)?;
        Ok(Self { conn })
    }

    fn select(&self, table: &str) -> Result<Vec<AgencyRecord>, CleanupError> {
        let sql = format!("SELECT {COLUMNS} FROM {table} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let rows = stmt.query_map([], read_record).map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }
}

/// Databases written by the discovery tools predate the status column.
/// Adding it leaves every existing row NULL, which reads as pending.
fn migrate(conn: &Connection) -> Result<(), CleanupError> {
    for table in ["agencies", "undefined"] {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(storage)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        if !columns.iter().any(|c| c == "cleanup_status") {
            log::info!("adding cleanup_status column to {table}");
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN cleanup_status TEXT"))
                .map_err(storage)?;
        }
    }
    Ok(())
}

fn storage(e: rusqlite::Error) -> CleanupError {
    CleanupError::Storage(e.to_string())
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<AgencyRecord> {
    // every text column is nullable in older files
    let text = |idx: usize| -> rusqlite::Result<String> { Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default()) };

    Ok(AgencyRecord {
        id: row.get(0)?,
        name: text(1)?,
        category: Category::from_label(&text(2)?),
        website: text(3)?,
        phone: text(4)?,
        address: text(5)?,
        description: text(6)?,
        additional_info: text(7)?,
        status: ProcessingStatus::from_label(&text(8)?),
    })
}

fn update_in(conn: &Connection, r: &AgencyRecord) -> Result<(), CleanupError> {
    let changed = conn
        .execute(
            "UPDATE agencies SET name = ?2, type = ?3, website = ?4, phone = ?5, address = ?6, \
             description = ?7, additional_info = ?8, cleanup_status = ?9 WHERE id = ?1",
            params![
                r.id,
                r.name,
                r.category.label(),
                r.website,
                r.phone,
                r.address,
                r.description,
                r.additional_info,
                r.status.as_str()
            ],
        )
        .map_err(storage)?;
    if changed == 0 {
        return Err(CleanupError::Storage(format!("no record #{}", r.id)));
    }
    Ok(())
}

fn delete_in(conn: &Connection, id: i64) -> Result<(), CleanupError> {
    conn.execute("DELETE FROM agencies WHERE id = ?1", params![id])
        .map_err(storage)?;
    Ok(())
}

/// Ids are never reused while an archived row holds them, even in files whose
/// `agencies` table was declared without AUTOINCREMENT.
fn next_id(conn: &Connection) -> Result<i64, CleanupError> {
    conn.query_row(
        "SELECT MAX(COALESCE((SELECT MAX(id) FROM agencies), 0), \
                    COALESCE((SELECT MAX(id) FROM undefined), 0)) + 1",
        [],
        |row| row.get(0),
    )
    .map_err(storage)
}

fn archive_in(conn: &Connection, r: &AgencyRecord) -> Result<(), CleanupError> {
    conn.execute(
        &format!("INSERT INTO undefined ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            r.id,
            r.name,
            r.category.label(),
            r.website,
            r.phone,
            r.address,
            r.description,
            r.additional_info,
            ProcessingStatus::Archived.as_str()
        ],
    )
    .map_err(storage)?;
    Ok(())
}

impl RecordStore for SqliteStore {
    fn fetch_pending(&self) -> Result<Vec<AgencyRecord>, CleanupError> {
        let mut records = self.select("agencies")?;
        records.retain(|r| r.status == ProcessingStatus::Pending);
        Ok(records)
    }

    fn fetch_all(&self) -> Result<Vec<AgencyRecord>, CleanupError> {
        self.select("agencies")
    }

    fn fetch_archived(&self) -> Result<Vec<AgencyRecord>, CleanupError> {
        self.select("undefined")
    }

    fn update_record(&mut self, record: &AgencyRecord) -> Result<(), CleanupError> {
        update_in(&self.conn, record)
    }

    fn delete_record(&mut self, id: i64) -> Result<(), CleanupError> {
        delete_in(&self.conn, id)
    }

    fn insert_into_archive(&mut self, record: &AgencyRecord) -> Result<(), CleanupError> {
        archive_in(&self.conn, record)
    }

    fn insert_new(&mut self, a: &NewAgency) -> Result<i64, CleanupError> {
        let id = next_id(&self.conn)?;
        self.conn
            .execute(
                "INSERT INTO agencies (id, name, type, website, phone, address, description, additional_info, cleanup_status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    a.name,
                    Category::Unclassified.label(),
                    a.website,
                    a.phone,
                    a.address,
                    a.description,
                    a.additional_info,
                    ProcessingStatus::Pending.as_str()
                ],
            )
            .map_err(storage)?;
        Ok(id)
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<(), CleanupError> {
        // dropped without commit = rolled back
        let tx = self.conn.transaction().map_err(storage)?;
        for record in &changes.updates {
            update_in(&tx, record)?;
        }
        for id in &changes.deletions {
            delete_in(&tx, *id)?;
        }
        for record in &changes.archived {
            archive_in(&tx, record)?;
            delete_in(&tx, record.id)?;
        }
        tx.commit().map_err(storage)?;
        log::debug!(
            "committed {} update(s), {} deletion(s), {} archived",
            changes.updates.len(),
            changes.deletions.len(),
            changes.archived.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn new(name: &str, phone: &str) -> NewAgency {
        NewAgency {
            name: name.into(),
            phone: phone.into(),
            ..NewAgency::default()
        }
    }

    #[test]
    fn insert_and_fetch_pending() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_new(&new("Casa Sol", "+34 1")).unwrap();
        let pending = store.fetch_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].category, Category::Unclassified);
        assert_eq!(pending[0].status, ProcessingStatus::Pending);
    }

    #[test]
    fn failed_apply_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.insert_new(&new("Casa Sol", "+34 1")).unwrap();

        let mut cleaned = store.fetch_all().unwrap().remove(0);
        cleaned.status = ProcessingStatus::Cleaned;
        let changes = ChangeSet {
            updates: vec![cleaned, AgencyRecord::new(404, "missing")],
            ..ChangeSet::default()
        };
        assert!(matches!(store.apply(&changes), Err(CleanupError::Storage(_))));

        let all = store.fetch_all().unwrap();
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].status, ProcessingStatus::Pending);
    }

    #[test]
    fn apply_relocates_archived() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let keep = store.insert_new(&new("Keep", "+48 1")).unwrap();
        let gone = store.insert_new(&new("Gone", "")).unwrap();

        let record = store.fetch_all().unwrap().into_iter().find(|r| r.id == gone).unwrap();
        store
            .apply(&ChangeSet {
                archived: vec![record],
                ..ChangeSet::default()
            })
            .unwrap();

        let ids: Vec<i64> = store.fetch_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![keep]);
        let archived = store.fetch_archived().unwrap();
        assert_eq!(archived[0].id, gone);
        assert_eq!(archived[0].status, ProcessingStatus::Archived);
    }

    #[test]
    fn archiving_a_taken_id_fails() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO undefined (id, name) VALUES (1, 'First Ghost')", [])
            .unwrap();
        // external tools may still write ids by hand
        store
            .conn
            .execute("INSERT INTO agencies (id, name) VALUES (1, 'Second Ghost')", [])
            .unwrap();

        let record = store.fetch_all().unwrap().remove(0);
        let changes = ChangeSet {
            archived: vec![record],
            ..ChangeSet::default()
        };
        assert!(matches!(store.apply(&changes), Err(CleanupError::Storage(_))));

        let archived = store.fetch_archived().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].name, "First Ghost");
        assert_eq!(store.fetch_all().unwrap()[0].name, "Second Ghost");
    }

    #[test]
    fn new_ids_skip_archived_ones() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO undefined (id, name) VALUES (5, 'Archived')", [])
            .unwrap();
        assert_eq!(store.insert_new(&new("Fresh", "")).unwrap(), 6);
    }

    #[test]
    fn legacy_file_without_status_column() {
        let file = NamedTempFile::with_suffix(".db").unwrap();
        {
            let conn = Connection::open(file.path()).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE agencies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    type TEXT,
                    website TEXT,
                    phone TEXT,
                    address TEXT,
                    description TEXT,
                    additional_info TEXT,
                    polish_city TEXT
                );
                INSERT INTO agencies (name, type, website) VALUES ('Old One', 'Spain&Poland', 'https://old.es');
                INSERT INTO agencies (name, type, phone) VALUES ('Older', 'gemini_discovered', NULL);
            "#,
            )
            .unwrap();
        }

        let store = SqliteStore::open(file.path()).unwrap();
        let pending = store.fetch_pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].category, Category::DualRegion);
        assert_eq!(pending[1].category, Category::Unclassified);
        assert_eq!(pending[1].phone, "");
    }
}
