//! Configuration for pattern retrieval.
//!
//! Read from TOML. Every field has a default, so an empty file (or no file)
//! is a valid configuration:
//!
//! ```toml
//! corpus_path = "patterns.json"
//! cache_path = "embeddings_cache.json"
//!
//! [embedding]
//! provider = "local"
//! model = "all-MiniLM-L6-v2"
//!
//! [search]
//! top_k = 5
//! min_score = 0.0
//! ```

use std::path::{Path, PathBuf};
#[cfg(not(feature = "fastembed"))]
use std::sync::Arc;

#[cfg(not(feature = "fastembed"))]
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strudel_embeddings::{DEFAULT_LOCAL_MODEL, OpenAIFactory, ProviderFactory};
#[cfg(not(feature = "fastembed"))]
use strudel_embeddings::{EmbeddingError, EmbeddingProvider};

use crate::error::{Result, RetrievalError};

/// Default OpenAI model name.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Configuration for the pattern searcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Pattern corpus (JSON).
    pub corpus_path: PathBuf,

    /// Persisted embedding index.
    pub cache_path: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Query defaults.
    pub search: SearchConfig,
}

impl RetrievalConfig {
    /// Create a configuration for the given corpus with default values.
    pub fn new(corpus_path: impl Into<PathBuf>) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            ..Self::default()
        }
    }

    /// Default config file location (`<config dir>/strudel/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("strudel").join("config.toml"))
    }

    /// Parse a TOML document. Relative paths are left as written.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    fn parse_file(path: &Path) -> std::result::Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&content).map_err(|e| e.to_string())
    }

    /// Load a config file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::parse_file(path)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;

        if let Some(base) = path.parent() {
            config.corpus_path = resolve(base, &config.corpus_path);
            config.cache_path = resolve(base, &config.cache_path);
            if let Some(dir) = &config.embedding.model_cache_dir {
                config.embedding.model_cache_dir = Some(resolve(base, dir));
            }
        }
        Ok(config)
    }

    /// Like [`RetrievalConfig::load`], but a missing file yields defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Set the cache path.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("patterns.json"),
            cache_path: PathBuf::from("embeddings_cache.json"),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model name. Defaults depend on the provider.
    pub model: Option<String>,

    /// Texts per inference batch or per embeddings request.
    pub batch_size: Option<usize>,

    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Output dimension for self-hosted OpenAI-compatible models.
    pub dimension: Option<usize>,

    /// Where local model weights are downloaded.
    pub model_cache_dir: Option<PathBuf>,

    /// Show a progress bar while downloading local weights.
    pub show_download_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Local,
            model: None,
            batch_size: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimension: None,
            model_cache_dir: None,
            show_download_progress: true,
        }
    }
}

impl EmbeddingConfig {
    /// Configured model, or the provider's default.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, EmbeddingProviderType::Local) => DEFAULT_LOCAL_MODEL,
            (None, EmbeddingProviderType::OpenAI) => DEFAULT_OPENAI_MODEL,
        }
    }

    /// Factory for the configured provider. Nothing is loaded here.
    pub fn factory(&self) -> Box<dyn ProviderFactory> {
        match self.provider {
            EmbeddingProviderType::OpenAI => {
                let mut factory = OpenAIFactory::new(self.model_name())
                    .with_api_key_env(self.api_key_env.clone());
                if let Some(url) = &self.base_url {
                    factory = factory.with_base_url(url.clone());
                }
                if let Some(dimension) = self.dimension {
                    factory = factory.with_dimension(dimension);
                }
                if let Some(batch_size) = self.batch_size {
                    factory = factory.with_batch_size(batch_size);
                }
                Box::new(factory)
            }
            EmbeddingProviderType::Local => self.local_factory(),
        }
    }

    #[cfg(feature = "fastembed")]
    fn local_factory(&self) -> Box<dyn ProviderFactory> {
        let mut factory = strudel_embeddings::FastEmbedFactory::new(self.model_name())
            .with_download_progress(self.show_download_progress);
        if let Some(dir) = &self.model_cache_dir {
            factory = factory.with_cache_dir(dir.clone());
        }
        if let Some(batch_size) = self.batch_size {
            factory = factory.with_batch_size(batch_size);
        }
        Box::new(factory)
    }

    #[cfg(not(feature = "fastembed"))]
    fn local_factory(&self) -> Box<dyn ProviderFactory> {
        Box::new(UnavailableFactory {
            model: self.model_name().to_string(),
        })
    }
}

/// Stands in for the local provider when it was not compiled in. A valid
/// cached index can still be adopted; anything needing the model fails.
#[cfg(not(feature = "fastembed"))]
struct UnavailableFactory {
    model: String,
}

#[cfg(not(feature = "fastembed"))]
#[async_trait]
impl ProviderFactory for UnavailableFactory {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn create(&self) -> strudel_embeddings::Result<Arc<dyn EmbeddingProvider>> {
        Err(EmbeddingError::ProviderNotConfigured(
            "local embedding models are not compiled in; rebuild with the `local-model` \
             feature or set embedding.provider = \"openai\""
                .to_string(),
        ))
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Local fastembed model.
    Local,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Defaults for queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned by a free-text search.
    pub top_k: usize,

    /// Minimum score for free-text search results.
    pub min_score: f32,

    /// Results returned by a similar-pattern lookup.
    pub similar_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
            similar_top_k: 5,
        }
    }
}
