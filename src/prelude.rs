//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```ignore
//! use context_localizer::prelude::*;
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::default())?;
//! let output = pipeline.run(&table, &mut KnnVoteClassifier::new(16))?;
//! ```
//!
//! # What's Included
//!
//! ## Core Pipeline
//! - [`Pipeline`], [`PipelineBuilder`], [`PipelineConfig`], [`PipelineOutput`]
//!
//! ## Data
//! - [`FeatureTable`] - Loaded, label-encoded source table
//! - [`WindowBuilder`], [`TrainingBank`], [`TestQuery`]
//!
//! ## Retrieval
//! - [`NcaLearner`], [`MetricProjection`]
//! - [`KnnIndex`]
//! - [`ContextAssembler`], [`ContextSet`], [`RetrievalGranularity`]
//!
//! ## Inference
//! - [`InContextClassifier`] - Classifier service trait
//! - [`ContextSnapshot`] - Per-batch conditioning state
//! - [`KnnVoteClassifier`], [`ProcessClassifier`]
//! - [`InferenceLoop`], [`LogProgress`]
//!
//! ## Evaluation
//! - [`ClassificationMetrics`], [`EvaluationReport`]

pub use crate::builder::PipelineBuilder;
pub use crate::classifier::{
    ContextSnapshot, InContextClassifier, KnnVoteClassifier, ProcessClassifier,
};
pub use crate::config::{ClassifierConfig, PipelineConfig};
pub use crate::context::{ContextAssembler, ContextSet, RetrievalGranularity};
pub use crate::error::{LocalizerError, Result};
pub use crate::evaluation::{ClassificationMetrics, EvaluationReport};
pub use crate::index::KnnIndex;
pub use crate::inference::{InferenceLoop, LogProgress, ProgressCallback};
pub use crate::metric::{MetricProjection, NcaLearner};
pub use crate::pipeline::{Pipeline, PipelineOutput};
pub use crate::source::FeatureTable;
pub use crate::windowing::{TestQuery, TrainingBank, WindowBuilder};
