//! Dense row-major score matrices.
//!
//! A [`ScoreMatrix`] holds one row per active beam slot and one column per
//! vocabulary entry. Cells are additive log-scores. The same layout is used
//! for attention, where columns are source positions.

use crate::error::{BeamlineError, Result};

/// Row-major `rows x columns` matrix of `f32` scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    rows: usize,
    columns: usize,
    data: Vec<f32>,
}

/// Attention weights share the score matrix layout (rows x source positions).
pub type AttentionMatrix = ScoreMatrix;

impl ScoreMatrix {
    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            data: vec![0.0; rows * columns],
        }
    }

    /// Wrap a row-major buffer.
    pub fn from_vec(rows: usize, columns: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * columns {
            return Err(BeamlineError::ShapeMismatch(format!(
                "buffer of {} values cannot be a {}x{} matrix",
                data.len(),
                rows,
                columns
            )));
        }
        Ok(Self {
            rows,
            columns,
            data,
        })
    }

    /// Build from a slice of equally sized rows.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let columns = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * columns);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != columns {
                return Err(BeamlineError::ShapeMismatch(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    columns
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            columns,
            data,
        })
    }

    /// Number of rows (active beam slots).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (vocabulary size).
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the matrix has no cells.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat row-major view.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume into the flat row-major buffer.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Get one row.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.columns;
        &self.data[start..start + self.columns]
    }

    /// Rows `start..end` as one contiguous slice.
    pub fn row_range(&self, start: usize, end: usize) -> &[f32] {
        &self.data[start * self.columns..end * self.columns]
    }

    /// Get a single cell.
    pub fn get(&self, row: usize, column: usize) -> f32 {
        self.data[row * self.columns + column]
    }

    /// Check that `other` has the same shape.
    pub fn check_same_shape(&self, other: &ScoreMatrix) -> Result<()> {
        if self.rows != other.rows || self.columns != other.columns {
            return Err(BeamlineError::ShapeMismatch(format!(
                "expected {}x{} matrix, got {}x{}",
                self.rows, self.columns, other.rows, other.columns
            )));
        }
        Ok(())
    }

    /// Multiply every cell by `factor`.
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Add `bias[row]` to every cell of that row.
    pub fn add_row_bias(&mut self, bias: &[f32]) -> Result<()> {
        if bias.len() != self.rows {
            return Err(BeamlineError::ShapeMismatch(format!(
                "row bias of length {} for {} rows",
                bias.len(),
                self.rows
            )));
        }
        if self.columns == 0 {
            return Ok(());
        }
        for (row, &b) in self.data.chunks_exact_mut(self.columns).zip(bias) {
            for v in row {
                *v += b;
            }
        }
        Ok(())
    }

    /// `self += factor * other`, elementwise.
    pub fn add_scaled(&mut self, other: &ScoreMatrix, factor: f32) -> Result<()> {
        self.check_same_shape(other)?;
        for (v, &o) in self.data.iter_mut().zip(&other.data) {
            *v += factor * o;
        }
        Ok(())
    }

    /// Set every row's `column` to `value`. Out-of-range columns are ignored.
    pub fn fill_column(&mut self, column: usize, value: f32) {
        if column >= self.columns {
            return;
        }
        for row in 0..self.rows {
            self.data[row * self.columns + column] = value;
        }
    }
}
