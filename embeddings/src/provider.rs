//! Embedding providers.
//!
//! A provider turns text into fixed-dimension vectors. Providers are
//! expensive to construct (model weights, HTTP clients with credentials), so
//! they are created through a [`ProviderFactory`] and shared behind a
//! [`crate::LazyProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::matrix::EmbeddingMatrix;
use crate::Embedding;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Model identifier. Stored alongside cached embeddings.
    fn model(&self) -> &str;

    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed a single string.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed many strings, one row per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix> {
        let mut matrix = EmbeddingMatrix::with_capacity(self.dimension(), texts.len());
        for text in texts {
            matrix.push_row(&self.embed(text).await?)?;
        }
        Ok(matrix)
    }
}

/// Builds a provider on demand.
///
/// `model_name` must be answerable without loading anything: the searcher
/// uses it to validate a cached index before deciding whether the model is
/// needed at all.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Model the created provider will report from [`EmbeddingProvider::model`].
    fn model_name(&self) -> &str;

    /// Construct the provider. Called at most once per [`crate::LazyProvider`].
    async fn create(&self) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, LM Studio).
pub struct OpenAIProvider {
    /// API key.
    api_key: String,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model to request.
    model: String,

    /// Expected output dimension.
    dimension: usize,

    /// Inputs per request; `None` sends everything at once.
    batch_size: Option<usize>,
}

impl OpenAIProvider {
    /// Create a provider for `text-embedding-3-small` on api.openai.com.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            batch_size: None,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model. Known OpenAI models also set the dimension.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        if let Some(dimension) = Self::known_dimension(&self.model) {
            self.dimension = dimension;
        }
        self
    }

    /// Set the expected dimension explicitly (for self-hosted models).
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Cap the number of inputs sent in one request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    fn known_dimension(model: &str) -> Option<usize> {
        match model {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        }
    }

    async fn request(&self, input: serde_json::Value) -> Result<Vec<Embedding>> {
        let body = serde_json::json!({
            "input": input,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let mut result: OpenAIEmbeddingResponse = response.json().await?;
        // The API may answer out of order; `index` is authoritative.
        result.data.sort_by_key(|item| item.index);

        let embeddings: Vec<Embedding> = result.data.into_iter().map(|item| item.embedding).collect();
        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        debug!("Generating embedding with model: {}", self.model);

        self.request(serde_json::json!(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix> {
        if texts.is_empty() {
            return Ok(EmbeddingMatrix::new(self.dimension));
        }

        debug!(
            "Generating batch embeddings for {} texts with model: {}",
            texts.len(),
            self.model
        );

        let mut matrix = EmbeddingMatrix::with_capacity(self.dimension, texts.len());
        for chunk in texts.chunks(self.batch_size.unwrap_or(texts.len())) {
            let embeddings = self.request(serde_json::json!(chunk)).await?;
            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }
            for embedding in &embeddings {
                matrix.push_row(embedding)?;
            }
        }

        info!("Generated {} batch embeddings", matrix.rows());
        Ok(matrix)
    }
}

/// Creates an [`OpenAIProvider`], failing fast when no key is available.
pub struct OpenAIFactory {
    model: String,
    base_url: Option<String>,
    api_key_env: String,
    dimension: Option<usize>,
    batch_size: Option<usize>,
}

impl OpenAIFactory {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimension: None,
            batch_size: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Environment variable holding the API key.
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = var.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Inputs per embeddings request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

#[async_trait]
impl ProviderFactory for OpenAIFactory {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn create(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            EmbeddingError::ProviderNotConfigured(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))
        })?;

        let mut provider = OpenAIProvider::new(api_key).with_model(self.model.clone());
        if let Some(url) = &self.base_url {
            provider = provider.with_base_url(url.clone());
        }
        if let Some(dimension) = self.dimension {
            provider = provider.with_dimension(dimension);
        }
        if let Some(batch_size) = self.batch_size {
            provider = provider.with_batch_size(batch_size);
        }

        Ok(Arc::new(provider))
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::new("test-key")
            .with_base_url(server.uri())
            .with_model("nomic-embed-text")
            .with_dimension(3)
    }

    #[test]
    fn test_known_model_dimensions() {
        let provider = OpenAIProvider::new("key").with_model("text-embedding-3-large");
        assert_eq!(provider.dimension(), 3072);

        let provider = OpenAIProvider::new("key")
            .with_model("nomic-embed-text")
            .with_dimension(768);
        assert_eq!(provider.dimension(), 768);
    }

    #[tokio::test]
    async fn test_embed_batch_reorders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "embedding": [0.0, 1.0, 0.0], "index": 1 },
                    { "embedding": [1.0, 0.0, 0.0], "index": 0 }
                ],
                "model": "nomic-embed-text"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let matrix = provider(&server)
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.row(0), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(matrix.row(1), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[tokio::test]
    async fn test_embed_batch_splits_by_batch_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "embedding": [1.0, 0.0, 0.0], "index": 0 },
                    { "embedding": [0.0, 1.0, 0.0], "index": 1 }
                ],
                "model": "nomic-embed-text"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|t| t.to_string()).collect();
        let matrix = provider(&server)
            .with_batch_size(2)
            .embed_batch(&texts)
            .await
            .unwrap();

        assert_eq!(matrix.rows(), 4);
        assert_eq!(matrix.row(2), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(matrix.row(3), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[tokio::test]
    async fn test_embed_rejects_wrong_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [1.0, 0.0], "index": 0 }],
                "model": "nomic-embed-text"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::RateLimited {
                retry_after_secs: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

        let matrix = provider(&server).embed_batch(&[]).await.unwrap();
        assert!(matrix.is_empty());
        assert_eq!(matrix.dimension(), 3);
    }

    #[tokio::test]
    async fn test_factory_fails_fast_without_key() {
        let factory = OpenAIFactory::new("text-embedding-3-small")
            .with_api_key_env("STRUDEL_TEST_KEY_THAT_IS_NEVER_SET");

        assert_eq!(factory.model_name(), "text-embedding-3-small");
        let err = factory.create().await.err().unwrap();
        assert!(matches!(err, EmbeddingError::ProviderNotConfigured(_)));
    }
}
