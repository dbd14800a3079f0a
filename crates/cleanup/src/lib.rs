//! `agency-cleanup`: incremental cleanup engine for agency records.
//!
//! Pure engine crate: receives pending records, returns a change set.
//! Persistence lives behind the [`RecordStore`] trait; no SQLite or CLI here.

pub mod archive;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod model;
pub mod names;
pub mod pipeline;
pub mod scoring;
pub mod store;
pub mod summary;
pub mod urls;

pub use config::CleanupConfig;
pub use error::CleanupError;
pub use model::{AgencyRecord, Category, ChangeSet, NewAgency, ProcessingStatus};
pub use pipeline::{run, RunReport};
pub use store::RecordStore;
