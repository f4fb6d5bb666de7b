//! In-memory pattern corpus.
//!
//! The corpus is loaded once from a JSON document of the form
//! `{ "patterns": [ ... ] }` and is read-only afterwards. Record order is the
//! source order and is significant: embedding rows follow it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{PatternError, Result};
use crate::record::PatternRecord;

#[derive(Deserialize)]
struct CorpusFile {
    patterns: Vec<PatternRecord>,
}

/// Ordered, validated collection of pattern records.
#[derive(Debug, Clone, Default)]
pub struct PatternCorpus {
    patterns: Vec<Arc<PatternRecord>>,

    /// id -> position in `patterns`.
    positions: HashMap<String, usize>,
}

impl PatternCorpus {
    /// Load and validate a corpus file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|source| PatternError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let corpus = Self::from_json_str(&content)?;
        info!("Loaded {} patterns from {}", corpus.len(), path.display());
        Ok(corpus)
    }

    /// Parse and validate a corpus document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CorpusFile = serde_json::from_str(json)?;
        Self::from_records(file.patterns)
    }

    /// Build a corpus from records, rejecting empty or duplicate ids.
    pub fn from_records(records: impl IntoIterator<Item = PatternRecord>) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut positions = HashMap::new();

        for (position, record) in records.into_iter().enumerate() {
            if record.id.trim().is_empty() {
                return Err(PatternError::EmptyId { position });
            }
            if positions.insert(record.id.clone(), position).is_some() {
                return Err(PatternError::DuplicateId(record.id));
            }
            patterns.push(Arc::new(record));
        }

        debug!("Validated {} pattern records", patterns.len());
        Ok(Self {
            patterns,
            positions,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Record at `position`.
    pub fn at(&self, position: usize) -> Option<&Arc<PatternRecord>> {
        self.patterns.get(position)
    }

    /// Look a record up by id.
    pub fn get(&self, id: &str) -> Option<&Arc<PatternRecord>> {
        self.position(id).and_then(|position| self.patterns.get(position))
    }

    /// Position of `id` in corpus order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Identifiers in corpus order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.id.as_str())
    }

    /// Records in corpus order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PatternRecord>> {
        self.patterns.iter()
    }

    /// Embedding input for every record, in corpus order.
    pub fn embedding_texts(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.embedding_text()).collect()
    }
}
