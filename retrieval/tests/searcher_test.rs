//! End-to-end tests for index building, cache reuse and ranking.
//!
//! All tests use the bag-of-words mock provider, so texts sharing words are
//! similar and no model is downloaded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use strudel_embeddings::mock::{MockFactory, MockProvider};
use strudel_embeddings::{CacheLoad, IndexCache, LazyProvider};
use strudel_retrieval::{
    IndexSource, IndexState, PatternCorpus, PatternRecord, PatternSearcher, RetrievalConfig,
    RetrievalError,
};
use tempfile::TempDir;

const DIMENSION: usize = 256;

/// The sample corpus shipped with the repository.
fn sample_corpus_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data/patterns.json")
}

fn record(id: &str, description: &str, mood: &str, tags: &[&str]) -> PatternRecord {
    PatternRecord {
        id: id.to_string(),
        name: id.to_string(),
        description: description.to_string(),
        mood: mood.to_string(),
        tempo: "medium".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        code: format!("s(\"{id}\")"),
    }
}

fn base_records() -> Vec<PatternRecord> {
    vec![
        record("a", "slow dark ambient pad", "ambient", &["ambient", "pad"]),
        record("b", "pounding warehouse techno kick", "techno", &["techno", "kick"]),
        record("c", "glassy bells over a drone", "calm", &["bells", "drone"]),
    ]
}

struct Harness {
    searcher: PatternSearcher,
    provider: Arc<MockProvider>,
    loads: Arc<std::sync::atomic::AtomicUsize>,
}

fn harness(records: Vec<PatternRecord>, cache_path: &Path) -> Harness {
    let factory = MockFactory::new(DIMENSION);
    let provider = factory.provider();
    let loads = factory.load_counter();
    let searcher = PatternSearcher::new(
        Arc::new(PatternCorpus::from_records(records).unwrap()),
        IndexCache::new(cache_path),
        Arc::new(LazyProvider::new(factory)),
    );
    Harness {
        searcher,
        provider,
        loads,
    }
}

#[tokio::test]
async fn test_index_has_one_row_per_pattern_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("index.json");
    let h = harness(base_records(), &cache_path);

    let outcome = h.searcher.build_index(false).await.unwrap();
    assert_eq!(outcome.source, IndexSource::Computed);
    assert_eq!(outcome.patterns, 3);

    let CacheLoad::Hit(cached) = IndexCache::new(&cache_path).load().await else {
        panic!("cache should have been written");
    };
    assert_eq!(cached.snapshot().ids(), ["a", "b", "c"]);
    assert_eq!(cached.matrix().rows(), 3);
    assert_eq!(cached.matrix().dimension(), DIMENSION);
}

#[tokio::test]
async fn test_restart_with_unchanged_corpus_hits_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("index.json");

    let first = harness(base_records(), &cache_path);
    first.searcher.build_index(false).await.unwrap();
    assert_eq!(first.provider.batch_calls(), 1);

    let second = harness(base_records(), &cache_path);
    let outcome = second.searcher.build_index(false).await.unwrap();
    assert_eq!(outcome.source, IndexSource::Cache);
    assert_eq!(second.searcher.state(), IndexState::Ready);
    assert_eq!(second.provider.calls(), 0);
    assert_eq!(second.loads.load(Ordering::SeqCst), 0);
    assert!(!second.searcher.embedder().is_loaded());
}

#[tokio::test]
async fn test_corpus_changes_invalidate_cache() {
    let mut added = base_records();
    added.push(record("d", "new record", "calm", &["new"]));

    let mut removed = base_records();
    removed.pop();

    let mut reordered = base_records();
    reordered.swap(0, 2);

    for changed in [added, removed, reordered] {
        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("index.json");
        harness(base_records(), &cache_path)
            .searcher
            .build_index(false)
            .await
            .unwrap();

        let expected_rows = changed.len();
        let h = harness(changed, &cache_path);
        let outcome = h.searcher.build_index(false).await.unwrap();
        assert_eq!(outcome.source, IndexSource::Computed);
        assert_eq!(outcome.patterns, expected_rows);
        assert_eq!(h.provider.batch_calls(), 1);
    }
}

#[tokio::test]
async fn test_model_change_invalidates_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("index.json");
    harness(base_records(), &cache_path)
        .searcher
        .build_index(false)
        .await
        .unwrap();

    let factory = MockFactory::with_provider(MockProvider::new(DIMENSION).with_model("other-model"));
    let provider = factory.provider();
    let searcher = PatternSearcher::new(
        Arc::new(PatternCorpus::from_records(base_records()).unwrap()),
        IndexCache::new(&cache_path),
        Arc::new(LazyProvider::new(factory)),
    );

    let outcome = searcher.build_index(false).await.unwrap();
    assert_eq!(outcome.source, IndexSource::Computed);
    assert_eq!(provider.batch_calls(), 1);
}

#[tokio::test]
async fn test_corrupt_cache_triggers_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("index.json");
    std::fs::write(&cache_path, b"{ not json").unwrap();

    let h = harness(base_records(), &cache_path);
    let outcome = h.searcher.build_index(false).await.unwrap();
    assert_eq!(outcome.source, IndexSource::Computed);
    assert!(matches!(
        IndexCache::new(&cache_path).load().await,
        CacheLoad::Hit(_)
    ));
}

#[tokio::test]
async fn test_forced_rebuild_recomputes() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("index.json");
    let h = harness(base_records(), &cache_path);

    h.searcher.build_index(false).await.unwrap();
    let outcome = h.searcher.build_index(true).await.unwrap();
    assert_eq!(outcome.source, IndexSource::Computed);
    assert_eq!(h.provider.batch_calls(), 2);
    assert_eq!(h.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dark_ambient_query_prefers_ambient_pattern() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(
        vec![
            record("a", "ambient", "ambient", &["ambient"]),
            record("b", "techno", "techno", &["techno"]),
        ],
        &temp_dir.path().join("index.json"),
    );

    let results = h.searcher.search("dark ambient", 1, 0.0).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pattern.id, "a");

    let all = h.searcher.search("dark ambient", 2, -1.0).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].score > all[1].score);
}

#[tokio::test]
async fn test_search_respects_k_order_and_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(base_records(), &temp_dir.path().join("index.json"));

    for (k, min_score) in [(1, 0.0), (2, 0.1), (10, 0.0), (10, 0.3)] {
        let results = h.searcher.search("dark drone pad", k, min_score).await.unwrap();
        assert!(results.len() <= k);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.score >= min_score));
        assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
    }

    // More results requested than patterns exist.
    assert_eq!(h.searcher.search("anything", 10, -1.0).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_high_threshold_returns_empty_not_error() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(base_records(), &temp_dir.path().join("index.json"));

    let results = h.searcher.search("orchestral film score", 5, 0.9).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_similar_to_excludes_self() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(base_records(), &temp_dir.path().join("index.json"));

    for id in ["a", "b", "c"] {
        let results = h.searcher.similar_to(id, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.pattern.id != id));
    }

    let results = h.searcher.similar_to("a", 1).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_similar_to_unknown_id_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(base_records(), &temp_dir.path().join("index.json"));
    h.searcher.build_index(false).await.unwrap();

    let err = h.searcher.similar_to("zzz", 3).await.unwrap_err();
    assert!(matches!(err, RetrievalError::PatternNotFound(id) if id == "zzz"));
}

#[tokio::test]
async fn test_concurrent_first_queries_build_once() {
    let temp_dir = TempDir::new().unwrap();
    let h = harness(base_records(), &temp_dir.path().join("index.json"));
    let searcher = Arc::new(h.searcher);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let searcher = Arc::clone(&searcher);
            tokio::spawn(async move { searcher.search("techno kick", 2, 0.0).await })
        })
        .collect();
    for handle in handles {
        let results = handle.await.unwrap().unwrap();
        assert_eq!(results[0].pattern.id, "b");
    }

    assert_eq!(h.provider.batch_calls(), 1);
    assert_eq!(h.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sample_corpus_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = RetrievalConfig::new(sample_corpus_path())
        .with_cache_path(temp_dir.path().join("index.json"));

    let searcher = PatternSearcher::from_config(&config).await.unwrap();
    assert_eq!(searcher.state(), IndexState::Uninitialized);
    assert!(searcher.pattern("acid-bassline").is_some());
    assert_eq!(searcher.patterns().count(), searcher.corpus().len());
}

#[tokio::test]
async fn test_missing_corpus_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let config = RetrievalConfig::new(temp_dir.path().join("missing.json"));

    let err = PatternSearcher::from_config(&config).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Corpus(_)));
}
