//! Built-in distance-weighted k-NN vote.

use super::{ContextSnapshot, InContextClassifier};
use crate::error::{LocalizerError, Result};
use crate::index::KnnIndex;
use ndarray::ArrayView2;
use std::collections::BTreeMap;

/// Keeps zero-distance matches finite.
const DISTANCE_EPSILON: f64 = 1e-9;

/// Votes among the `k` context examples closest to each query, weighted by
/// inverse Euclidean distance in the original feature space.
///
/// Ties between classes go to the lower label.
#[derive(Debug, Clone)]
pub struct KnnVoteClassifier {
    k: usize,
}

impl KnnVoteClassifier {
    /// Create a classifier voting over `k` neighbors.
    pub fn new(k: usize) -> Self {
        Self { k: k.max(1) }
    }

    /// Voting neighbors.
    pub fn k(&self) -> usize {
        self.k
    }
}

impl InContextClassifier for KnnVoteClassifier {
    fn name(&self) -> &str {
        "knn-vote"
    }

    fn describe(&self) -> String {
        format!("knn-vote(k={})", self.k)
    }

    fn predict(&mut self, context: &ContextSnapshot, queries: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        if context.is_empty() {
            return Err(LocalizerError::config("cannot vote over an empty context"));
        }
        if queries.ncols() != context.features().ncols() {
            return Err(LocalizerError::config(format!(
                "queries have {} features, context has {}",
                queries.ncols(),
                context.features().ncols()
            )));
        }

        let index = KnnIndex::build(context.features().to_owned(), self.k)?;
        let neighbors = index.query_batch(queries)?;
        let labels = context.labels();

        Ok(neighbors
            .into_iter()
            .map(|row| {
                let mut votes: BTreeMap<usize, f64> = BTreeMap::new();
                for n in row {
                    *votes.entry(labels[n.index]).or_insert(0.0) += 1.0 / (n.distance + DISTANCE_EPSILON);
                }
                let mut best = (0, f64::NEG_INFINITY);
                for (label, weight) in votes {
                    if weight > best.1 {
                        best = (label, weight);
                    }
                }
                best.0
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_votes_follow_nearest_examples() {
        let context = ContextSnapshot::new(
            array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0]],
            vec![2, 2, 7, 7],
        )
        .unwrap();
        let mut classifier = KnnVoteClassifier::new(2);

        let predictions = classifier
            .predict(&context, array![[0.05, 0.0], [4.9, 5.1]].view())
            .unwrap();
        assert_eq!(predictions, vec![2, 7]);
    }

    #[test]
    fn test_closer_neighbor_outweighs_farther_pair() {
        let context = ContextSnapshot::new(array![[0.0], [3.0], [3.2]], vec![0, 1, 1]).unwrap();
        let mut classifier = KnnVoteClassifier::new(3);

        // Weight 1/0.1 for class 0 beats 1/2.9 + 1/3.1 for class 1
        let predictions = classifier.predict(&context, array![[0.1]].view()).unwrap();
        assert_eq!(predictions, vec![0]);
    }

    #[test]
    fn test_description_includes_k() {
        assert_eq!(KnnVoteClassifier::new(5).describe(), "knn-vote(k=5)");
        assert_ne!(KnnVoteClassifier::new(1).describe(), KnnVoteClassifier::new(5).describe());
    }

    #[test]
    fn test_k_larger_than_context() {
        let context = ContextSnapshot::new(array![[0.0], [1.0]], vec![4, 4]).unwrap();
        let mut classifier = KnnVoteClassifier::new(16);
        assert_eq!(classifier.predict(&context, array![[9.0]].view()).unwrap(), vec![4]);
    }

    #[test]
    fn test_empty_context_and_width_mismatch() {
        let mut classifier = KnnVoteClassifier::new(3);
        let empty = ContextSnapshot::new(ndarray::Array2::zeros((0, 2)), Vec::new()).unwrap();
        assert!(classifier.predict(&empty, array![[0.0, 0.0]].view()).is_err());

        let context = ContextSnapshot::new(array![[0.0, 0.0]], vec![0]).unwrap();
        assert!(classifier.predict(&context, array![[0.0]].view()).is_err());
    }
}
