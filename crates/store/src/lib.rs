// Agency storage: SQLite tables + JSON snapshot

pub mod json;
pub mod sqlite;

pub use sqlite::SqliteStore;
