//! Error types for building and querying the store.
//!
//! The taxonomy follows how far an error is allowed to propagate:
//!
//! * [`Error::TransientResource`], [`Error::Extraction`], and [`Error::StructuralParse`] are recovered locally.
//!   The pipeline records them against a single resource or a single line and continues.
//! * [`Error::CorruptRecord`] is fatal for a single stored entry.
//! * [`Error::Configuration`] fails the entire build before any expensive work.
//! * [`Error::Io`] and [`Error::Database`] pass through failures of the environment.

use std::io;

use thiserror::Error;

//-----------------------------------------------------------------------------

/// Error type for store construction and queries.
#[derive(Error, Debug)]
pub enum Error {
    /// Downloading a resource failed. Re-running the download stage may succeed.
    #[error("Failed to download resource {resource}: {message}")]
    TransientResource { resource: String, message: String },

    /// The cached file of a resource could not be listed or has no wanted entries.
    #[error("Failed to extract resource {resource}: {message}")]
    Extraction { resource: String, message: String },

    /// A line in a source file does not follow the expected grammar.
    #[error("{source_name}: {file} line {line}: {message}")]
    StructuralParse { source_name: String, file: String, line: usize, message: String },

    /// Stored bytes could not be decoded.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// The build or the store is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error outside the resource stages.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the underlying SQLite database.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Returns `true` if the error only affects a single resource, line, or entry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransientResource { .. } | Error::Extraction { .. } | Error::StructuralParse { .. } | Error::CorruptRecord(_)
        )
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
