//! Similarity computation for embeddings.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};
use crate::matrix::EmbeddingMatrix;

/// Score `query` against every row of `corpus`.
///
/// Both sides are normalized by their Euclidean norm, so each score is the
/// cosine of the angle between the query and that row, in `[-1.0, 1.0]`.
/// A zero-norm query or row scores `0.0` instead of NaN. Neither input is
/// modified.
pub fn cosine_similarity(query: &[f32], corpus: &EmbeddingMatrix) -> Result<Vec<f32>> {
    if query.len() != corpus.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: corpus.dimension(),
            actual: query.len(),
        });
    }

    let query_norm = norm(query);
    if query_norm == 0.0 || !query_norm.is_finite() {
        return Ok(vec![0.0; corpus.rows()]);
    }
    let unit_query: Vec<f32> = query.iter().map(|x| x / query_norm).collect();

    let scores = corpus
        .iter_rows()
        .map(|row| {
            let row_norm = norm(row);
            if row_norm == 0.0 {
                return 0.0;
            }
            let score = dot_product(row, &unit_query) / row_norm;
            if score.is_finite() {
                score.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        })
        .collect();

    Ok(scores)
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// A row of the corpus matrix together with its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    /// Row index into the matrix (and the corpus).
    pub row: usize,

    /// Similarity score.
    pub score: f32,
}

/// Pick the `k` best rows from `scores`.
///
/// Rows are ordered by descending score; equal scores keep their original
/// row order. Rows scoring below `min_score` are dropped, and `exclude`
/// (if any) never appears in the output. `k` larger than the number of
/// rows simply returns every qualifying row.
pub fn top_k(scores: &[f32], k: usize, min_score: f32, exclude: Option<usize>) -> Vec<ScoredRow> {
    let mut ranked: Vec<ScoredRow> = scores
        .iter()
        .enumerate()
        .filter(|(row, _)| Some(*row) != exclude)
        .map(|(row, score)| ScoredRow { row, score: *score })
        .collect();

    // Stable: ties stay in row order.
    ranked.sort_by_key(|r| std::cmp::Reverse(OrderedFloat(r.score)));

    ranked
        .into_iter()
        .take(k)
        .filter(|r| r.score >= min_score)
        .collect()
}
