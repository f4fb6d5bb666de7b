//! Local sentence-embedding models via fastembed (ONNX runtime).
//!
//! Loading downloads the weights on first use and takes seconds, so the
//! [`FastEmbedFactory`] is meant to sit behind a [`crate::LazyProvider`].
//! Inference is CPU-bound and runs on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::matrix::EmbeddingMatrix;
use crate::provider::{EmbeddingProvider, ProviderFactory};
use crate::{DEFAULT_LOCAL_MODEL, Embedding};

/// Map a model name onto a fastembed model and its output dimension.
pub fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-MiniLM-L12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "paraphrase-multilingual-mpnet-base-v2" => Ok((EmbeddingModel::ParaphraseMLMpnetBaseV2, 768)),
        other => Err(EmbeddingError::UnsupportedModel(other.to_string())),
    }
}

/// A loaded fastembed model.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: Option<usize>,
}

impl FastEmbedProvider {
    async fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || model.embed(texts, batch_size))
            .await
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?
            .map_err(|e| EmbeddingError::Inference(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embedding = self
            .run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("model returned no embedding".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix> {
        if texts.is_empty() {
            return Ok(EmbeddingMatrix::new(self.dimension));
        }

        debug!("Embedding {} texts with {}", texts.len(), self.model_name);
        let embeddings = self.run(texts.to_vec()).await?;
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        EmbeddingMatrix::from_rows(self.dimension, embeddings)
    }
}

/// Loads a [`FastEmbedProvider`].
pub struct FastEmbedFactory {
    model_name: String,
    cache_dir: Option<PathBuf>,
    batch_size: Option<usize>,
    show_download_progress: bool,
}

impl FastEmbedFactory {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            cache_dir: None,
            batch_size: None,
            show_download_progress: true,
        }
    }

    /// Where downloaded weights are kept.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }
}

impl Default for FastEmbedFactory {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_MODEL)
    }
}

#[async_trait]
impl ProviderFactory for FastEmbedFactory {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn create(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let (model, dimension) = resolve_model(&self.model_name)?;

        let mut options =
            InitOptions::new(model).with_show_download_progress(self.show_download_progress);
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        let model_name = self.model_name.clone();
        let loaded = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await
            .map_err(|e| EmbeddingError::ModelLoad {
                model: model_name.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| EmbeddingError::ModelLoad {
                model: model_name.clone(),
                reason: format!("{e:#}"),
            })?;

        info!("Loaded local embedding model {model_name} ({dimension} dimensions)");

        Ok(Arc::new(FastEmbedProvider {
            model: Arc::new(loaded),
            model_name,
            dimension,
            batch_size: self.batch_size,
        }))
    }
}
