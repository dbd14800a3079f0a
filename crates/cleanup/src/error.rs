use std::fmt;

/// Errors that abort a cleanup run.
///
/// Data-quality problems (bad URLs, empty names, ambiguous categories) are
/// never errors; they resolve to a terminal value on the record itself.
#[derive(Debug)]
pub enum CleanupError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad weight, duplicate region label, etc.).
    ConfigValidation(String),
    /// Record store unreachable, locked, or a statement failed.
    Storage(String),
    /// Ingest input could not be read as any supported shape.
    Ingest(String),
    /// IO error (file read/write).
    Io(String),
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Storage(msg) => write!(f, "storage error: {msg}"),
            Self::Ingest(msg) => write!(f, "ingest error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for CleanupError {}

impl From<std::io::Error> for CleanupError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
