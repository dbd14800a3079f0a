//! CLI Exit Code Registry
//!
//! Single source of truth for `agencies` exit codes. Scripts that chain
//! discovery, import and cleanup rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                              |
//! |---------|-----------|------------------------------------------|
//! | 0       | Universal | Success                                  |
//! | 1       | Universal | General error (unspecified)              |
//! | 2       | Universal | CLI usage error (bad args)               |
//! | 3-9     | config    | Cleanup config problems                  |
//! | 10-19   | store     | SQLite store problems                    |
//! | 20-29   | ingest    | Discovery response problems              |
//! | 30-39   | io        | Reading input / writing snapshots        |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Update the table above
//! 3. Map it in [`cleanup_exit_code`] or at the call site

use agency_cleanup::CleanupError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Config (3-9)
// =============================================================================

/// Config file is not valid TOML or has unknown value types.
pub const EXIT_CONFIG_PARSE: u8 = 3;

/// Config parsed but failed validation (threshold, weights, labels).
pub const EXIT_CONFIG_INVALID: u8 = 4;

// =============================================================================
// Store (10-19)
// =============================================================================

/// Database could not be opened, or a statement or commit failed.
/// Nothing from the failed command was committed.
pub const EXIT_STORE: u8 = 10;

// =============================================================================
// Ingest (20-29)
// =============================================================================

/// Discovery response contained a JSON block that does not parse.
pub const EXIT_INGEST_PARSE: u8 = 20;

// =============================================================================
// IO (30-39)
// =============================================================================

/// File could not be read or written.
pub const EXIT_IO: u8 = 30;

/// Map an engine error to its exit code.
pub fn cleanup_exit_code(err: &CleanupError) -> u8 {
    match err {
        CleanupError::ConfigParse(_) => EXIT_CONFIG_PARSE,
        CleanupError::ConfigValidation(_) => EXIT_CONFIG_INVALID,
        CleanupError::Storage(_) => EXIT_STORE,
        CleanupError::Ingest(_) => EXIT_INGEST_PARSE,
        CleanupError::Io(_) => EXIT_IO,
    }
}
