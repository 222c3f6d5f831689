//! Triplet accumulator for the sparse iteration matrix.

use gd_components::JacobianSink;
use nalgebra::DMatrix;

/// Collects `(row, col, value)` entries from every component in one evaluation pass.
///
/// Duplicate coordinates are summed when the matrix is materialized.
#[derive(Debug, Clone, Default)]
pub struct TripletAccumulator {
    entries: Vec<(usize, usize, f64)>,
}

impl TripletAccumulator {
    pub fn with_capacity(nnz: usize) -> Self {
        Self {
            entries: Vec::with_capacity(nnz),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(usize, usize, f64)] {
        &self.entries
    }

    /// Sorted, deduplicated nonzero coordinates.
    pub fn pattern(&self) -> Vec<(usize, usize)> {
        let mut p: Vec<_> = self.entries.iter().map(|&(r, c, _)| (r, c)).collect();
        p.sort_unstable();
        p.dedup();
        p
    }

    /// Dense `n × n` matrix; entries outside the square are ignored.
    pub fn to_dense(&self, n: usize) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(n, n);
        for &(r, c, v) in &self.entries {
            if r < n && c < n {
                m[(r, c)] += v;
            }
        }
        m
    }
}

impl JacobianSink for TripletAccumulator {
    #[inline]
    fn assign(&mut self, row: usize, col: usize, value: f64) {
        self.entries.push((row, col, value));
    }
}
