//! Context assembly: which historical windows condition the classifier.
//!
//! Every batch gets a bounded context of training-bank indices built from two
//! sources:
//!
//! - **Temporal anchor**: the most recent `n_temporal` bank entries, computed
//!   once before inference and reused for every batch.
//! - **Semantic retrieval**: the `k_sem` bank entries nearest to the batch in
//!   the learned metric space.
//!
//! ```text
//!  batch ──project──► centroid ──k-NN──► semantic ─┐
//!                                                 ├─► union ─► trim to K ─► ContextSet
//!  bank tail (fixed) ────────────────► anchor ────┘
//! ```
//!
//! When the union exceeds the budget `K`, the indices are sorted and only the
//! highest `K` survive. Since the anchor occupies the top of the index range,
//! older semantic matches are dropped first.

mod assembler;

pub use assembler::{ContextAssembler, ContextSet, RetrievalGranularity, TemporalAnchor};

/// Merge anchor and semantic indices into a context of at most `budget`.
///
/// Deduplicates, sorts ascending and, on overflow, keeps the highest
/// `budget` indices.
///
/// # Example
///
/// ```
/// use context_localizer::context::merge_context;
///
/// let anchor: Vec<usize> = (95..100).collect();
/// let semantic: Vec<usize> = (50..56).collect();
/// let context = merge_context(&anchor, &semantic, 10);
///
/// assert_eq!(context.as_slice(), &[51, 52, 53, 54, 55, 95, 96, 97, 98, 99]);
/// ```
pub fn merge_context(anchor: &[usize], semantic: &[usize], budget: usize) -> ContextSet {
    let mut indices: Vec<usize> = anchor.iter().chain(semantic.iter()).copied().collect();
    indices.sort_unstable();
    indices.dedup();

    if indices.len() > budget {
        indices.drain(..indices.len() - budget);
    }
    ContextSet::from_sorted(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_within_budget_is_kept() {
        let anchor: Vec<usize> = (95..100).collect();
        let semantic: Vec<usize> = (0..5).collect();
        let context = merge_context(&anchor, &semantic, 10);
        assert_eq!(context.as_slice(), &[0, 1, 2, 3, 4, 95, 96, 97, 98, 99]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let anchor: Vec<usize> = (95..100).collect();
        let semantic: Vec<usize> = (50..56).collect();
        let context = merge_context(&anchor, &semantic, 10);
        assert_eq!(context.len(), 10);
        assert!(!context.contains(50));
        assert!(context.contains(51));
        assert!(anchor.iter().all(|&i| context.contains(i)));
    }

    #[test]
    fn test_duplicates_counted_once() {
        let context = merge_context(&[8, 9], &[9, 8, 3], 3);
        assert_eq!(context.as_slice(), &[3, 8, 9]);
    }

    #[test]
    fn test_empty_semantic_yields_anchor() {
        let anchor: Vec<usize> = (40..50).collect();
        let context = merge_context(&anchor, &[], 10);
        assert_eq!(context.as_slice(), anchor.as_slice());
    }
}
