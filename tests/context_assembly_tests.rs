//! Context assembly properties over projected banks.

use context_localizer::config::RetrievalConfig;
use context_localizer::context::{merge_context, ContextAssembler, RetrievalGranularity};
use context_localizer::index::KnnIndex;
use context_localizer::metric::MetricProjection;
use ndarray::{array, Array2};

/// 2-D bank laid out on a slow spiral so neighbors are spread through the index range.
fn spiral(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, 2), |(r, c)| {
        let t = r as f64 * 0.37;
        let radius = 1.0 + r as f64 * 0.01;
        if c == 0 {
            radius * t.cos()
        } else {
            radius * t.sin()
        }
    })
}

fn assembler(bank: usize, k: usize, ratio: f64, granularity: RetrievalGranularity) -> ContextAssembler {
    let retrieval = RetrievalConfig {
        retrieval_k: k,
        temporal_ratio: ratio,
        granularity,
    };
    let index = KnnIndex::build(spiral(bank), retrieval.k_semantic()).unwrap();
    ContextAssembler::new(MetricProjection::new(array![[1.0, 0.0], [0.0, 1.0]]), index, &retrieval)
        .unwrap()
}

fn batches() -> Vec<Array2<f64>> {
    (0..12)
        .map(|b| {
            Array2::from_shape_fn((5, 2), |(r, c)| {
                let t = (b * 5 + r) as f64 * 0.9;
                if c == 0 {
                    2.0 * t.cos()
                } else {
                    1.5 * t.sin()
                }
            })
        })
        .collect()
}

// ============================================================================
// Budget
// ============================================================================

#[test]
fn test_context_never_exceeds_budget() {
    for granularity in [RetrievalGranularity::BatchCentroid, RetrievalGranularity::PerSample] {
        for &(k, ratio) in &[(10usize, 0.5), (16, 0.3), (7, 0.0), (25, 0.9)] {
            let assembler = assembler(300, k, ratio, granularity);
            for batch in batches() {
                let context = assembler.assemble(batch.view()).unwrap();
                assert!(context.len() <= k, "{granularity:?} k={k} ratio={ratio}");
                assert!(context.iter().all(|i| i < 300));
                assert!(context.as_slice().windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}

#[test]
fn test_anchor_survives_when_semantic_overlaps() {
    // Anchor is the top of the index range; overflow trimming drops low indices first
    let assembler = assembler(200, 20, 0.5, RetrievalGranularity::BatchCentroid);
    for batch in batches() {
        let context = assembler.assemble(batch.view()).unwrap();
        for &i in assembler.anchor().indices() {
            assert!(context.contains(i));
        }
    }
}

#[test]
fn test_full_temporal_ratio_equals_anchor() {
    let assembler = assembler(120, 32, 1.0, RetrievalGranularity::BatchCentroid);
    let expected: Vec<usize> = (88..120).collect();
    for batch in batches() {
        let context = assembler.assemble(batch.view()).unwrap();
        assert_eq!(context.as_slice(), expected.as_slice());
    }
}

#[test]
fn test_bank_smaller_than_budget_is_whole_bank() {
    for granularity in [RetrievalGranularity::BatchCentroid, RetrievalGranularity::PerSample] {
        let assembler = assembler(12, 64, 0.5, granularity);
        for batch in batches() {
            let context = assembler.assemble(batch.view()).unwrap();
            assert_eq!(context.as_slice(), (0..12).collect::<Vec<_>>().as_slice());
        }
    }
}

#[test]
fn test_zero_temporal_ratio_is_semantic_only() {
    let assembler = assembler(300, 8, 0.0, RetrievalGranularity::BatchCentroid);
    assert!(assembler.anchor().is_empty());
    let batch = &batches()[0];
    let context = assembler.assemble(batch.view()).unwrap();
    let mut semantic = assembler.semantic_indices(batch.view()).unwrap();
    semantic.sort_unstable();
    assert_eq!(context.as_slice(), semantic.as_slice());
    assert_eq!(context.len(), 8);
}

// ============================================================================
// Merge examples
// ============================================================================

#[test]
fn test_merge_disjoint_within_budget() {
    let anchor: Vec<usize> = (95..100).collect();
    let context = merge_context(&anchor, &[0, 1, 2, 3, 4], 10);
    assert_eq!(context.as_slice(), &[0, 1, 2, 3, 4, 95, 96, 97, 98, 99]);
}

#[test]
fn test_merge_overflow_trims_lowest() {
    let anchor: Vec<usize> = (95..100).collect();
    let semantic: Vec<usize> = (50..56).collect();
    let context = merge_context(&anchor, &semantic, 10);
    assert_eq!(context.as_slice(), &[51, 52, 53, 54, 55, 95, 96, 97, 98, 99]);
}

#[test]
fn test_assembly_is_deterministic() {
    let a = assembler(300, 16, 0.5, RetrievalGranularity::PerSample);
    let b = assembler(300, 16, 0.5, RetrievalGranularity::PerSample);
    for batch in batches() {
        assert_eq!(
            a.assemble(batch.view()).unwrap(),
            b.assemble(batch.view()).unwrap()
        );
    }
}
