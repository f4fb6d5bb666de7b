//! Deterministic providers for tests.
//!
//! [`MockProvider`] hashes lowercase word tokens into buckets, so texts that
//! share words point in similar directions. That is enough for ranking tests
//! without downloading a model. Every call is counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, ProviderFactory};
use crate::Embedding;

const MOCK_MODEL: &str = "mock-bag-of-words";

/// Bag-of-words hashing embedder.
///
/// Text with no word characters embeds to the zero vector.
#[derive(Debug)]
pub struct MockProvider {
    dimension: usize,
    model: String,
    embed_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: MOCK_MODEL.to_string(),
            embed_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Report a different model name (to exercise cache invalidation).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Number of single-text embeddings requested.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Number of batch embeddings requested.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Total number of provider invocations.
    pub fn calls(&self) -> usize {
        self.embed_calls() + self.batch_calls()
    }

    fn vectorize(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return embedding;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) % self.dimension as u64;
            embedding[bucket as usize] += 1.0;
        }
        embedding
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<crate::EmbeddingMatrix> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        crate::EmbeddingMatrix::from_rows(self.dimension, texts.iter().map(|t| self.vectorize(t)))
    }
}

/// Factory handing out one shared [`MockProvider`], counting loads.
#[derive(Debug)]
pub struct MockFactory {
    provider: Arc<MockProvider>,
    loads: Arc<AtomicUsize>,
}

impl MockFactory {
    pub fn new(dimension: usize) -> Self {
        Self::with_provider(MockProvider::new(dimension))
    }

    pub fn with_provider(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The provider this factory hands out, for inspecting call counts.
    pub fn provider(&self) -> Arc<MockProvider> {
        Arc::clone(&self.provider)
    }

    /// Counter incremented on every [`ProviderFactory::create`].
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    fn model_name(&self) -> &str {
        self.provider.model()
    }

    async fn create(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.provider) as Arc<dyn EmbeddingProvider>)
    }
}

/// Factory whose load always fails, for init-failure paths.
#[derive(Debug)]
pub struct FailingFactory {
    reason: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingFactory {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempt_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl ProviderFactory for FailingFactory {
    fn model_name(&self) -> &str {
        MOCK_MODEL
    }

    async fn create(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::ModelLoad {
            model: MOCK_MODEL.to_string(),
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmbeddingMatrix;
    use crate::similarity::cosine_similarity;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let provider = MockProvider::new(256);
        let query = provider.embed("dark ambient").await.unwrap();
        let ambient = provider.embed("Dark drones, ambient pads").await.unwrap();
        let techno = provider.embed("driving techno kick").await.unwrap();

        let corpus = EmbeddingMatrix::from_rows(256, [ambient, techno]).unwrap();
        let scores = cosine_similarity(&query, &corpus).unwrap();
        assert!(scores[0] > scores[1]);
        assert_eq!(provider.embed_calls(), 3);
    }

    #[tokio::test]
    async fn test_deterministic_and_counted() {
        let provider = MockProvider::new(32);
        let texts = vec!["a b".to_string(), "a b".to_string()];
        let matrix = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(matrix.row(0), matrix.row(1));
        assert_eq!(provider.batch_calls(), 1);
        assert_eq!(provider.calls(), 1);
    }
}
