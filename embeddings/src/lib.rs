//! # Embeddings
//!
//! Embedding generation, similarity scoring and index persistence for
//! Strudel pattern retrieval.
//!
//! ## Features
//!
//! - **Embedding Providers**: local fastembed models (feature `fastembed`)
//!   and OpenAI-compatible HTTP endpoints
//! - **Lazy Loading**: one shared provider per handle, loaded on first use
//! - **Similarity**: cosine scoring of a query against a whole matrix
//! - **Index Cache**: the corpus matrix persisted together with the ids it
//!   was built for
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ProviderFactory ──► LazyProvider ──► EmbeddingProvider         │
//! │                                            │                    │
//! │                                            ▼                    │
//! │  IndexCache ◄──── CachedIndex ◄──── EmbeddingMatrix             │
//! │                                            │                    │
//! │                                            ▼                    │
//! │                             cosine_similarity ──► top_k         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod lazy;
#[cfg(feature = "fastembed")]
pub mod local;
pub mod matrix;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod provider;
pub mod similarity;

pub use cache::{CacheLoad, CacheMiss, CachedIndex, CorpusSnapshot, IndexCache};
pub use error::{EmbeddingError, Result};
pub use lazy::LazyProvider;
#[cfg(feature = "fastembed")]
pub use local::{FastEmbedFactory, FastEmbedProvider};
pub use matrix::EmbeddingMatrix;
pub use provider::{EmbeddingProvider, OpenAIFactory, OpenAIProvider, ProviderFactory};
pub use similarity::{ScoredRow, cosine_similarity, top_k};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Default local sentence-embedding model.
pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";
