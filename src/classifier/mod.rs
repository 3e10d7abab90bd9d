//! In-context classifier services.
//!
//! A classifier conditions on a labeled context and predicts labels for a
//! batch of query windows. The conditioning state is passed explicitly on
//! every call as a [`ContextSnapshot`]; backends keep no context between
//! calls, so each batch fully replaces whatever the previous one supplied.
//!
//! # Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`KnnVoteClassifier`] | Distance-weighted k-NN vote over the context, in process |
//! | [`ProcessClassifier`] | External service speaking JSON lines over stdin/stdout |
//!
//! Classifiers always receive unprojected window features. The learned
//! metric is only used to pick the context.

mod knn;
mod process;

pub use knn::KnnVoteClassifier;
pub use process::ProcessClassifier;

use crate::config::ClassifierConfig;
use crate::context::ContextSet;
use crate::error::{LocalizerError, Result};
use crate::windowing::TrainingBank;
use ndarray::{Array2, ArrayView2, Axis};

/// Immutable conditioning state for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    features: Array2<f64>,
    labels: Vec<usize>,
    indices: Vec<usize>,
}

impl ContextSnapshot {
    /// Gather the context rows out of the training bank.
    pub fn from_bank(bank: &TrainingBank, context: &ContextSet) -> Result<Self> {
        if let Some(&bad) = context.as_slice().iter().find(|&&i| i >= bank.len()) {
            return Err(LocalizerError::config(format!(
                "context index {bad} outside training bank of {}",
                bank.len()
            )));
        }
        let indices = context.as_slice().to_vec();
        let features = bank.features.select(Axis(0), &indices);
        let labels = indices.iter().map(|&i| bank.labels[i]).collect();
        Ok(Self {
            features,
            labels,
            indices,
        })
    }

    /// Build a snapshot directly from rows and labels.
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(LocalizerError::config(format!(
                "context has {} rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        let indices = (0..labels.len()).collect();
        Ok(Self {
            features,
            labels,
            indices,
        })
    }

    /// Context features, one row per example.
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Context labels.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Bank indices the rows came from.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of context examples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the context is empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A classifier that is conditioned on a labeled context at prediction time.
pub trait InContextClassifier {
    /// Backend name for logs and reports.
    fn name(&self) -> &str;

    /// Name plus every setting that affects predictions.
    ///
    /// Result logs written under one description are not resumed under
    /// another.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Predict one label per row of `queries`, conditioned only on `context`.
    fn predict(&mut self, context: &ContextSnapshot, queries: ArrayView2<'_, f64>) -> Result<Vec<usize>>;

    /// Release accelerator or cache memory held by the service.
    ///
    /// Advisory: must not change later predictions.
    fn release_memory(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the classifier named in the configuration.
pub fn from_config(config: &ClassifierConfig) -> Result<Box<dyn InContextClassifier>> {
    match config {
        ClassifierConfig::KnnVote { k } => Ok(Box::new(KnnVoteClassifier::new(*k))),
        ClassifierConfig::Process { command, args } => {
            Ok(Box::new(ProcessClassifier::spawn(command, args)?))
        }
    }
}
