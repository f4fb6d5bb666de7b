//! Lazily loaded, shared embedding provider.
//!
//! Loading a model is the most expensive thing the retrieval stack does, so a
//! [`LazyProvider`] defers it until the first caller actually needs vectors and
//! then hands the same instance to everyone. Handles are passed explicitly
//! (usually as `Arc<LazyProvider>`); there is no process-global model.
//!
//! State machine:
//! - cell empty -> not loaded yet
//! - cell holds `Ok` -> ready, shared by all callers
//! - cell holds `Err` -> load failed; every later call fails with the same cause

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, ProviderFactory};

type LoadOutcome = std::result::Result<Arc<dyn EmbeddingProvider>, String>;

/// Single-instance provider handle with on-demand initialization.
pub struct LazyProvider {
    factory: Box<dyn ProviderFactory>,
    cell: OnceCell<LoadOutcome>,
}

impl LazyProvider {
    /// Wrap a factory. Nothing is loaded until [`LazyProvider::get`].
    pub fn new(factory: impl ProviderFactory + 'static) -> Self {
        Self::from_factory(Box::new(factory))
    }

    /// Wrap an already boxed factory (as produced from configuration).
    pub fn from_factory(factory: Box<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            cell: OnceCell::new(),
        }
    }

    /// Model name the provider will report, known without loading it.
    pub fn model_name(&self) -> &str {
        self.factory.model_name()
    }

    /// Whether a provider has been successfully loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// Get the shared provider, loading it on first use.
    ///
    /// Concurrent first callers wait on a single load. A failed load is
    /// remembered and reported to every later caller without retrying.
    pub async fn get(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let outcome = self
            .cell
            .get_or_init(|| async {
                let model = self.factory.model_name().to_string();
                info!("Loading embedding model {model}...");
                match self.factory.create().await {
                    Ok(provider) => {
                        info!(
                            "Embedding model {model} ready ({} via {})",
                            provider.dimension(),
                            provider.name()
                        );
                        Ok(provider)
                    }
                    Err(e) => {
                        error!("Failed to load embedding model {model}: {e}");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match outcome {
            Ok(provider) => Ok(Arc::clone(provider)),
            Err(reason) => Err(EmbeddingError::ModelLoad {
                model: self.factory.model_name().to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for LazyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyProvider")
            .field("model", &self.model_name())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
