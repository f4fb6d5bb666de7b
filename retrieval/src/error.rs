//! Error types for pattern retrieval.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The corpus could not be loaded. Fatal at startup.
    #[error("corpus error: {0}")]
    Corpus(#[from] strudel_patterns::PatternError),

    /// Embedding, model loading or cache write failure.
    #[error("embedding error: {0}")]
    Embedding(#[from] strudel_embeddings::EmbeddingError),

    /// No pattern with this id in the corpus.
    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The text generator failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
