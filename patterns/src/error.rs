//! Error types for corpus loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that reject a corpus. There is no partial load.
#[derive(Error, Debug)]
pub enum PatternError {
    /// The corpus source could not be read.
    #[error("failed to read corpus {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source is not a valid pattern collection.
    #[error("malformed corpus: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A record has an empty identifier.
    #[error("pattern at position {position} has an empty id")]
    EmptyId { position: usize },

    /// Two records share an identifier.
    #[error("duplicate pattern id: {0}")]
    DuplicateId(String),
}
