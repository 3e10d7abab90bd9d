//! Per-batch context assembler.

use super::merge_context;
use crate::config::RetrievalConfig;
use crate::error::{LocalizerError, Result};
use crate::index::KnnIndex;
use crate::metric::MetricProjection;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How semantic neighbors are retrieved for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalGranularity {
    /// One query per batch: the mean of the batch's projected windows.
    #[default]
    BatchCentroid,

    /// One query per window. Candidates from all windows are ranked by their
    /// smallest distance to any window and the best `k_sem` kept.
    PerSample,
}

/// Fixed slice of the most recent training-bank indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalAnchor {
    indices: Vec<usize>,
}

impl TemporalAnchor {
    /// The last `n_temporal` indices of a bank of `bank_len` entries
    /// (the whole bank when it is smaller).
    pub fn most_recent(bank_len: usize, n_temporal: usize) -> Self {
        let start = bank_len.saturating_sub(n_temporal);
        Self {
            indices: (start..bank_len).collect(),
        }
    }

    /// Anchor indices, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Anchor size.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the anchor is empty (`temporal_ratio = 0`).
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Deduplicated training-bank indices conditioning one batch.
///
/// Indices are kept ascending; callers should treat the value as a set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextSet {
    indices: Vec<usize>,
}

impl ContextSet {
    pub(crate) fn from_sorted(indices: Vec<usize>) -> Self {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self { indices }
    }

    /// Indices, ascending.
    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Iterate indices ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}

/// Builds a [`ContextSet`] per batch from the temporal anchor and semantic
/// retrieval.
///
/// Owns the fitted projection and the index; both are read-only for the
/// lifetime of the assembler.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    projection: MetricProjection,
    index: KnnIndex,
    anchor: TemporalAnchor,
    budget: usize,
    granularity: RetrievalGranularity,
}

impl ContextAssembler {
    /// Create an assembler over a bank of `index.len()` entries.
    ///
    /// The anchor is computed here, once.
    pub fn new(projection: MetricProjection, index: KnnIndex, config: &RetrievalConfig) -> Result<Self> {
        if config.retrieval_k == 0 {
            return Err(LocalizerError::config("retrieval_k must be > 0"));
        }
        if projection.n_components() != index.dim() {
            return Err(LocalizerError::config(format!(
                "projection outputs {} dims but index holds {}-dim points",
                projection.n_components(),
                index.dim()
            )));
        }

        let anchor = TemporalAnchor::most_recent(index.len(), config.n_temporal());
        log::info!(
            "Context budget {}: anchor {} (bank {}..{}), semantic k = {}, granularity {:?}",
            config.retrieval_k,
            anchor.len(),
            anchor.indices().first().copied().unwrap_or(0),
            index.len(),
            index.k(),
            config.granularity
        );

        Ok(Self {
            projection,
            index,
            anchor,
            budget: config.retrieval_k,
            granularity: config.granularity,
        })
    }

    /// Temporal anchor shared by every batch.
    pub fn anchor(&self) -> &TemporalAnchor {
        &self.anchor
    }

    /// Context budget `K`.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Retrieval granularity in use.
    pub fn granularity(&self) -> RetrievalGranularity {
        self.granularity
    }

    /// Fitted projection.
    pub fn projection(&self) -> &MetricProjection {
        &self.projection
    }

    /// Semantic index.
    pub fn index(&self) -> &KnnIndex {
        &self.index
    }

    /// Whether the whole bank fits in the budget.
    pub fn bank_fits_budget(&self) -> bool {
        self.index.len() <= self.budget
    }

    /// Assemble the context for one batch of unprojected windows.
    ///
    /// A bank no larger than the budget is returned whole.
    pub fn assemble(&self, batch: ArrayView2<'_, f64>) -> Result<ContextSet> {
        if self.bank_fits_budget() {
            if batch.nrows() == 0 {
                return Err(LocalizerError::config("cannot assemble context for an empty batch"));
            }
            return Ok(ContextSet::from_sorted((0..self.index.len()).collect()));
        }
        let semantic = self.semantic_indices(batch)?;
        Ok(merge_context(self.anchor.indices(), &semantic, self.budget))
    }

    /// Semantic neighbors for a batch, closest first.
    pub fn semantic_indices(&self, batch: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        if batch.nrows() == 0 {
            return Err(LocalizerError::config("cannot assemble context for an empty batch"));
        }
        if self.index.k() == 0 {
            return Ok(Vec::new());
        }

        match self.granularity {
            RetrievalGranularity::BatchCentroid => {
                let centroid = self.projection.centroid(batch)?;
                let neighbors = self.index.query(centroid.view())?;
                Ok(neighbors.into_iter().map(|n| n.index).collect())
            }
            RetrievalGranularity::PerSample => {
                let projected = self.projection.transform(batch)?;
                let per_row = self.index.query_batch(projected.view())?;

                let mut best: BTreeMap<usize, f64> = BTreeMap::new();
                for neighbor in per_row.into_iter().flatten() {
                    best.entry(neighbor.index)
                        .and_modify(|d| *d = d.min(neighbor.distance))
                        .or_insert(neighbor.distance);
                }

                let mut ranked: Vec<(usize, f64)> = best.into_iter().collect();
                ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                ranked.truncate(self.index.k());
                Ok(ranked.into_iter().map(|(index, _)| index).collect())
            }
        }
    }
}
