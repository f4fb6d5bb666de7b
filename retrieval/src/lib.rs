//! # Pattern Retrieval
//!
//! Semantic search over a corpus of Strudel patterns:
//!
//! - **Corpus**: validated pattern records, loaded once
//! - **Index**: one embedding per record, cached on disk and reused while
//!   the corpus and model are unchanged
//! - **Queries**: free-text search and "more like this pattern"
//! - **RAG**: retrieved patterns rendered as context for a text generator
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Pattern Searcher                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Pattern    │  │    Index     │  │  Embedding   │           │
//! │  │   Corpus     │  │    Cache     │  │  Provider    │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │   Resident   │                               │
//! │                  │    Matrix    │                               │
//! │                  └──────────────┘                               │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │    Cosine    │ ──► RagOrchestrator            │
//! │                  │    top-k     │                               │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strudel_retrieval::{PatternSearcher, RetrievalConfig};
//!
//! let config = RetrievalConfig::load("strudel.toml")?;
//! let searcher = PatternSearcher::from_config(&config).await?;
//!
//! for hit in searcher.search("dark ambient drone", 5, 0.0).await? {
//!     println!("{:.3} {}", hit.score, hit.pattern.name);
//! }
//! ```

pub mod config;
pub mod error;
pub mod rag;
pub mod searcher;

pub use config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig, SearchConfig};
pub use error::{Result, RetrievalError};
pub use rag::{
    ExampleRef, Generation, GenerationRequest, RagOrchestrator, TextGenerator, format_examples,
    strip_code_fence,
};
pub use searcher::{BuildOutcome, IndexSource, IndexState, PatternSearcher, SearchResult};

// Re-export from dependencies for convenience
pub use strudel_embeddings::{EmbeddingProvider, IndexCache, LazyProvider};
pub use strudel_patterns::{PatternCorpus, PatternRecord};
