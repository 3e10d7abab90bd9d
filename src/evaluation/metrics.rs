//! Classification metrics.
//!
//! Conventions:
//!
//! - Any zero denominator yields `0.0`.
//! - Weighted averages weight each class by its support in the ground truth.
//! - Macro averages run over labels present in the ground truth or the
//!   predictions.
//! - Balanced accuracy is the mean recall over labels present in the ground
//!   truth.
//! - The per-class breakdown covers every label of the universe, including
//!   classes that never occur.

use crate::error::{LocalizerError, Result};
use serde::{Deserialize, Serialize};

/// Square confusion matrix; `counts[t][p]` counts truth `t` predicted as `p`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Tally `truth` against `predicted` over `n_classes` labels.
    pub fn from_labels(truth: &[usize], predicted: &[usize], n_classes: usize) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(LocalizerError::config(format!(
                "{} ground-truth labels but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }
        if truth.is_empty() {
            return Err(LocalizerError::config("cannot evaluate zero predictions"));
        }

        let mut counts = vec![vec![0u64; n_classes]; n_classes];
        for (&t, &p) in truth.iter().zip(predicted) {
            if t >= n_classes || p >= n_classes {
                return Err(LocalizerError::config(format!(
                    "label pair ({t}, {p}) outside 0..{n_classes}"
                )));
            }
            counts[t][p] += 1;
        }
        Ok(Self { counts })
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    /// Count for truth `t` predicted as `p`.
    pub fn get(&self, t: usize, p: usize) -> u64 {
        self.counts[t][p]
    }

    /// Raw counts.
    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// Total samples.
    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Occurrences of class `c` in the ground truth.
    pub fn true_count(&self, c: usize) -> u64 {
        self.counts[c].iter().sum()
    }

    /// Occurrences of class `c` in the predictions.
    pub fn predicted_count(&self, c: usize) -> u64 {
        self.counts.iter().map(|row| row[c]).sum()
    }

    /// Correct predictions.
    pub fn correct(&self) -> u64 {
        (0..self.n_classes()).map(|c| self.counts[c][c]).sum()
    }
}

/// Per-class scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Encoded class index
    pub label: usize,

    /// Display name
    pub name: String,

    pub precision: f64,
    pub recall: f64,
    pub f1: f64,

    /// Ground-truth occurrences
    pub support: u64,
}

/// Aggregate and per-class metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub f1_macro: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub recall_macro: f64,
    pub balanced_accuracy: f64,

    /// Matthews correlation coefficient (multiclass form)
    pub mcc: f64,

    /// Number of evaluated predictions
    pub n_samples: usize,

    /// One entry per label of the universe
    pub per_class: Vec<ClassMetrics>,

    pub confusion: ConfusionMatrix,
}

#[inline]
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

impl ClassificationMetrics {
    /// Score `predicted` against `truth`; `class_names` defines the label universe.
    pub fn compute(truth: &[usize], predicted: &[usize], class_names: &[String]) -> Result<Self> {
        let n_classes = class_names.len();
        let confusion = ConfusionMatrix::from_labels(truth, predicted, n_classes)?;
        let total = confusion.total() as f64;

        let per_class: Vec<ClassMetrics> = (0..n_classes)
            .map(|c| {
                let tp = confusion.get(c, c) as f64;
                let support = confusion.true_count(c);
                let precision = ratio(tp, confusion.predicted_count(c) as f64);
                let recall = ratio(tp, support as f64);
                ClassMetrics {
                    label: c,
                    name: class_names[c].clone(),
                    precision,
                    recall,
                    f1: ratio(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect();

        let weighted = |score: fn(&ClassMetrics) -> f64| {
            ratio(
                per_class.iter().map(|m| score(m) * m.support as f64).sum(),
                total,
            )
        };
        let in_truth: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let in_either: Vec<&ClassMetrics> = per_class
            .iter()
            .filter(|m| m.support > 0 || confusion.predicted_count(m.label) > 0)
            .collect();
        let mean = |items: &[&ClassMetrics], score: fn(&ClassMetrics) -> f64| {
            ratio(items.iter().map(|m| score(*m)).sum(), items.len() as f64)
        };

        Ok(Self {
            accuracy: ratio(confusion.correct() as f64, total),
            f1_weighted: weighted(|m| m.f1),
            f1_macro: mean(in_either.as_slice(), |m| m.f1),
            precision_weighted: weighted(|m| m.precision),
            recall_weighted: weighted(|m| m.recall),
            recall_macro: mean(in_either.as_slice(), |m| m.recall),
            balanced_accuracy: mean(in_truth.as_slice(), |m| m.recall),
            mcc: matthews(&confusion),
            n_samples: truth.len(),
            per_class,
            confusion,
        })
    }
}

/// `(c·s − Σ p_k t_k) / sqrt((s² − Σ p_k²)(s² − Σ t_k²))`
fn matthews(confusion: &ConfusionMatrix) -> f64 {
    let s = confusion.total() as f64;
    let c = confusion.correct() as f64;
    let (mut pt, mut pp, mut tt) = (0.0, 0.0, 0.0);
    for k in 0..confusion.n_classes() {
        let p = confusion.predicted_count(k) as f64;
        let t = confusion.true_count(k) as f64;
        pt += p * t;
        pp += p * p;
        tt += t * t;
    }
    let den = ((s * s - pp) * (s * s - tt)).sqrt();
    ratio(c * s - pt, den)
}
