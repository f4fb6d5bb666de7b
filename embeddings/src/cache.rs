//! Persisted embedding index.
//!
//! The cache is a single JSON blob pairing the ordered list of corpus
//! identifiers at build time with the matrix computed for them. Loading never
//! fails: anything short of a well-formed blob is reported as a
//! [`CacheLoad::Miss`] so the caller rebuilds. Whether a loaded index still
//! fits the live corpus is the caller's decision (see [`CachedIndex::is_valid_for`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::matrix::EmbeddingMatrix;

/// Version written into every blob. Blobs with another version are corrupt.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Ordered corpus identifiers at the moment an index was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusSnapshot(Vec<String>);

impl CorpusSnapshot {
    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CorpusSnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A snapshot and the matrix built for it, row `i` embedding id `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedIndex {
    version: u32,
    model: String,
    pattern_ids: CorpusSnapshot,
    embeddings: EmbeddingMatrix,
}

impl CachedIndex {
    /// Pair a snapshot with its matrix. Row count must equal the id count.
    pub fn new(model: impl Into<String>, snapshot: CorpusSnapshot, matrix: EmbeddingMatrix) -> Result<Self> {
        if snapshot.len() != matrix.rows() {
            return Err(EmbeddingError::Cache(format!(
                "{} identifiers but {} embedding rows",
                snapshot.len(),
                matrix.rows()
            )));
        }
        Ok(Self {
            version: CACHE_FORMAT_VERSION,
            model: model.into(),
            pattern_ids: snapshot,
            embeddings: matrix,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn snapshot(&self) -> &CorpusSnapshot {
        &self.pattern_ids
    }

    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn into_matrix(self) -> EmbeddingMatrix {
        self.embeddings
    }

    /// Usable only for the exact same ids in the exact same order, embedded
    /// by the same model.
    pub fn is_valid_for(&self, current: &CorpusSnapshot, model: &str) -> bool {
        self.model == model && self.pattern_ids == *current
    }

    fn check_well_formed(&self) -> std::result::Result<(), String> {
        if self.version != CACHE_FORMAT_VERSION {
            return Err(format!(
                "format version {} (expected {CACHE_FORMAT_VERSION})",
                self.version
            ));
        }
        if !self.embeddings.is_well_formed() {
            return Err("embedding data is not a whole number of rows".to_string());
        }
        if self.embeddings.rows() != self.pattern_ids.len() {
            return Err(format!(
                "{} identifiers but {} embedding rows",
                self.pattern_ids.len(),
                self.embeddings.rows()
            ));
        }
        Ok(())
    }
}

/// Why a load produced no index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMiss {
    /// No cache file.
    NotFound,
    /// The file exists but could not be read.
    Unreadable(String),
    /// The file was read but is not a valid index.
    Corrupt(String),
}

impl std::fmt::Display for CacheMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheMiss::NotFound => write!(f, "no cache file"),
            CacheMiss::Unreadable(reason) => write!(f, "cache unreadable: {reason}"),
            CacheMiss::Corrupt(reason) => write!(f, "cache corrupt: {reason}"),
        }
    }
}

/// Outcome of [`IndexCache::load`].
#[derive(Debug)]
pub enum CacheLoad {
    Hit(CachedIndex),
    Miss(CacheMiss),
}

/// File-backed store for a single [`CachedIndex`].
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
}

impl IndexCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted index. Never errors; see [`CacheMiss`].
    pub async fn load(&self) -> CacheLoad {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CacheLoad::Miss(CacheMiss::NotFound);
            }
            Err(e) => {
                return CacheLoad::Miss(CacheMiss::Unreadable(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };

        let index: CachedIndex = match serde_json::from_slice(&content) {
            Ok(index) => index,
            Err(e) => return CacheLoad::Miss(CacheMiss::Corrupt(e.to_string())),
        };
        if let Err(reason) = index.check_well_formed() {
            return CacheLoad::Miss(CacheMiss::Corrupt(reason));
        }

        debug!(
            "Read cached index with {} rows from {}",
            index.snapshot().len(),
            self.path.display()
        );
        CacheLoad::Hit(index)
    }

    /// Replace the persisted index.
    ///
    /// Writes a sibling temp file and renames it into place, so a concurrent
    /// reader sees either the old blob or the new one.
    pub async fn save(&self, index: &CachedIndex) -> Result<()> {
        let content = serde_json::to_vec(index)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                EmbeddingError::Cache(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        fs::write(&temp_path, &content).await.map_err(|e| {
            EmbeddingError::Cache(format!("failed to write {}: {e}", temp_path.display()))
        })?;
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            EmbeddingError::Cache(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        info!(
            "Saved index cache ({} rows) to {}",
            index.snapshot().len(),
            self.path.display()
        );
        Ok(())
    }
}
