//! Exact Euclidean nearest-neighbor index over the projected bank.
//!
//! The projected space is low-dimensional (typically 16) and the bank holds a
//! few thousand rows, so an exact parallel scan is both fast and free of the
//! recall loss of approximate structures. Results are ordered by increasing
//! distance with ties broken by lower bank index, which keeps retrieval
//! deterministic.

use crate::error::{LocalizerError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::cmp::Ordering;

/// One retrieval result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Training bank index
    pub index: usize,

    /// Euclidean distance in projected space
    pub distance: f64,
}

/// Read-only nearest-neighbor index.
#[derive(Debug, Clone)]
pub struct KnnIndex {
    points: Array2<f64>,
    k: usize,
}

impl KnnIndex {
    /// Build an index returning `k` neighbors per query.
    ///
    /// `k` is clamped to the number of indexed points.
    pub fn build(points: Array2<f64>, k: usize) -> Result<Self> {
        if points.ncols() == 0 {
            return Err(LocalizerError::config("cannot index zero-dimensional points"));
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(LocalizerError::fitting("projected bank contains non-finite values"));
        }
        let k = k.min(points.nrows());
        log::debug!(
            "Built k-NN index: {} points x {} dims, k = {}",
            points.nrows(),
            points.ncols(),
            k
        );
        Ok(Self { points, k })
    }

    /// Neighbors returned per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Dimension of indexed points.
    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    /// Indexed points.
    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    /// The `k` nearest points to `query`, closest first.
    pub fn query(&self, query: ArrayView1<'_, f64>) -> Result<Vec<Neighbor>> {
        self.query_k(query, self.k)
    }

    /// The `k` nearest points to `query` for an explicit `k`.
    pub fn query_k(&self, query: ArrayView1<'_, f64>, k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim() {
            return Err(LocalizerError::config(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dim()
            )));
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = (0..self.len())
            .into_par_iter()
            .map(|index| Neighbor {
                index,
                distance: squared_distance(self.points.row(index), query),
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, compare_neighbors);
            scored.truncate(k);
        }
        scored.sort_by(compare_neighbors);
        for neighbor in &mut scored {
            neighbor.distance = neighbor.distance.sqrt();
        }
        Ok(scored)
    }

    /// Query every row of `queries` in parallel; results keep row order.
    pub fn query_batch(&self, queries: ArrayView2<'_, f64>) -> Result<Vec<Vec<Neighbor>>> {
        (0..queries.nrows())
            .into_par_iter()
            .map(|row| self.query(queries.row(row)))
            .collect()
    }
}

#[inline]
fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}
