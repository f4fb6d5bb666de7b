//! The pattern searcher.
//!
//! Ties the corpus, the index cache and the embedding provider together.
//! The resident matrix lives behind an async `RwLock`: queries take a cheap
//! `Arc` clone under a read lock, while a build holds the write lock for its
//! whole duration so no query ever sees a half-built index.

use std::sync::Arc;

use serde::Serialize;
use strudel_embeddings::{
    CacheLoad, CacheMiss, CachedIndex, CorpusSnapshot, EmbeddingError, EmbeddingMatrix,
    IndexCache, LazyProvider, ScoredRow, cosine_similarity, top_k,
};
use strudel_patterns::{PatternCorpus, PatternRecord};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};

/// One ranked hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The matched record, shared with the corpus.
    pub pattern: Arc<PatternRecord>,

    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

/// Where a resident index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    /// Adopted from a valid cache file.
    Cache,
    /// Embedded from scratch and written to the cache.
    Computed,
}

/// Result of [`PatternSearcher::build_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub source: IndexSource,

    /// Rows in the resident index.
    pub patterns: usize,
}

/// Readiness of the resident index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Uninitialized,
    Building,
    Ready,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexState::Uninitialized => write!(f, "uninitialized"),
            IndexState::Building => write!(f, "building"),
            IndexState::Ready => write!(f, "ready"),
        }
    }
}

/// Semantic search over a pattern corpus.
pub struct PatternSearcher {
    corpus: Arc<PatternCorpus>,
    cache: IndexCache,
    embedder: Arc<LazyProvider>,
    index: RwLock<Option<Arc<EmbeddingMatrix>>>,
}

impl PatternSearcher {
    /// Create a searcher. No index is built and no model is loaded yet.
    pub fn new(corpus: Arc<PatternCorpus>, cache: IndexCache, embedder: Arc<LazyProvider>) -> Self {
        Self {
            corpus,
            cache,
            embedder,
            index: RwLock::new(None),
        }
    }

    /// Load the corpus named by `config` and wire up its provider and cache.
    pub async fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let corpus = PatternCorpus::load(&config.corpus_path).await?;
        let embedder = LazyProvider::from_factory(config.embedding.factory());
        Ok(Self::new(
            Arc::new(corpus),
            IndexCache::new(&config.cache_path),
            Arc::new(embedder),
        ))
    }

    pub fn corpus(&self) -> &Arc<PatternCorpus> {
        &self.corpus
    }

    /// All records in corpus order.
    pub fn patterns(&self) -> impl Iterator<Item = &Arc<PatternRecord>> {
        self.corpus.iter()
    }

    /// Look a record up by id.
    pub fn pattern(&self, id: &str) -> Option<&Arc<PatternRecord>> {
        self.corpus.get(id)
    }

    pub fn embedder(&self) -> &Arc<LazyProvider> {
        &self.embedder
    }

    pub fn state(&self) -> IndexState {
        match self.index.try_read() {
            Err(_) => IndexState::Building,
            Ok(guard) if guard.is_some() => IndexState::Ready,
            Ok(_) => IndexState::Uninitialized,
        }
    }

    /// Make an index resident.
    ///
    /// Unless `force` is set, a cached index is adopted when its id sequence
    /// and model match the current corpus exactly. Otherwise every record is
    /// embedded, the result is persisted, and only then does it replace the
    /// resident index. A failed build leaves the previous index in place.
    pub async fn build_index(&self, force: bool) -> Result<BuildOutcome> {
        let mut slot = self.index.write().await;
        let (source, matrix) = self.build_locked(&mut slot, force).await?;
        Ok(BuildOutcome {
            source,
            patterns: matrix.rows(),
        })
    }

    /// Rank the corpus against free text.
    ///
    /// Builds the index on first use. Returns at most `k` results with a
    /// score of at least `min_score`, best first; ties keep corpus order.
    pub async fn search(&self, query: &str, k: usize, min_score: f32) -> Result<Vec<SearchResult>> {
        let matrix = self.resident().await?;
        if matrix.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let provider = self.embedder.get().await?;
        let query_embedding = provider.embed(query).await?;
        let scores = cosine_similarity(&query_embedding, &matrix)?;
        let ranked = top_k(&scores, k, min_score, None);

        debug!("Query {query:?} matched {} patterns", ranked.len());
        Ok(self.to_results(ranked))
    }

    /// Rank the corpus against an existing record, excluding the record.
    pub async fn similar_to(&self, id: &str, k: usize) -> Result<Vec<SearchResult>> {
        let row = self
            .corpus
            .position(id)
            .ok_or_else(|| RetrievalError::PatternNotFound(id.to_string()))?;

        let matrix = self.resident().await?;
        let target = matrix
            .row(row)
            .ok_or_else(|| RetrievalError::PatternNotFound(id.to_string()))?;
        let scores = cosine_similarity(target, &matrix)?;
        let ranked = top_k(&scores, k, f32::NEG_INFINITY, Some(row));

        Ok(self.to_results(ranked))
    }

    async fn resident(&self) -> Result<Arc<EmbeddingMatrix>> {
        if let Some(matrix) = self.index.read().await.as_ref() {
            return Ok(Arc::clone(matrix));
        }

        let mut slot = self.index.write().await;
        // Another task may have finished a build while we waited.
        if let Some(matrix) = slot.as_ref() {
            return Ok(Arc::clone(matrix));
        }
        let (_, matrix) = self.build_locked(&mut slot, false).await?;
        Ok(matrix)
    }

    async fn build_locked(
        &self,
        slot: &mut Option<Arc<EmbeddingMatrix>>,
        force: bool,
    ) -> Result<(IndexSource, Arc<EmbeddingMatrix>)> {
        let snapshot: CorpusSnapshot = self.corpus.ids().collect();
        let model = self.embedder.model_name().to_string();

        if force {
            info!("Forced rebuild of the pattern index");
        } else {
            match self.cache.load().await {
                CacheLoad::Hit(cached) if cached.is_valid_for(&snapshot, &model) => {
                    info!(
                        "Loaded cached embeddings for {} patterns from {}",
                        snapshot.len(),
                        self.cache.path().display()
                    );
                    let matrix = Arc::new(cached.into_matrix());
                    *slot = Some(Arc::clone(&matrix));
                    return Ok((IndexSource::Cache, matrix));
                }
                CacheLoad::Hit(cached) => {
                    info!(
                        "Cached index is stale ({} patterns, model {}), rebuilding",
                        cached.snapshot().len(),
                        cached.model()
                    );
                }
                CacheLoad::Miss(CacheMiss::NotFound) => {
                    info!("No cached index at {}", self.cache.path().display());
                }
                CacheLoad::Miss(miss) => {
                    warn!("Ignoring index cache: {miss}");
                }
            }
        }

        let provider = self.embedder.get().await?;
        let texts = self.corpus.embedding_texts();
        info!("Computing embeddings for {} patterns...", texts.len());

        let matrix = provider.embed_batch(&texts).await?;
        if matrix.rows() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                matrix.rows()
            ))
            .into());
        }

        let cached = CachedIndex::new(model, snapshot, matrix)?;
        self.cache.save(&cached).await?;

        let matrix = Arc::new(cached.into_matrix());
        *slot = Some(Arc::clone(&matrix));
        Ok((IndexSource::Computed, matrix))
    }

    fn to_results(&self, ranked: Vec<ScoredRow>) -> Vec<SearchResult> {
        ranked
            .into_iter()
            .filter_map(|hit| {
                self.corpus.at(hit.row).map(|pattern| SearchResult {
                    pattern: Arc::clone(pattern),
                    score: hit.score,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for PatternSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternSearcher")
            .field("patterns", &self.corpus.len())
            .field("cache", &self.cache.path())
            .field("embedder", &self.embedder)
            .field("state", &self.state())
            .finish()
    }
}
