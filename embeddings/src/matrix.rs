//! Dense row-major embedding matrix.

use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

/// One embedding per row, all rows sharing the same dimension.
///
/// Row `i` belongs to whatever item was at position `i` when the matrix was
/// built; the matrix itself carries no identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    dimension: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Create an empty matrix with the given row width.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Create an empty matrix with room for `rows` rows.
    pub fn with_capacity(dimension: usize, rows: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * rows),
        }
    }

    /// Stack `rows` into a matrix of width `dimension`.
    pub fn from_rows<I, R>(dimension: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f32]>,
    {
        let mut matrix = Self::new(dimension);
        for row in rows {
            matrix.push_row(row.as_ref())?;
        }
        Ok(matrix)
    }

    /// Append a row. Fails if its length differs from the matrix width.
    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Width of every row.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Borrow row `index`, if present.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end).filter(|_| self.dimension > 0)
    }

    /// Iterate rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on zero; an empty slice yields no rows either way
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Whether the backing buffer holds a whole number of rows.
    pub(crate) fn is_well_formed(&self) -> bool {
        if self.dimension == 0 {
            self.data.is_empty()
        } else {
            self.data.len() % self.dimension == 0
        }
    }
}
