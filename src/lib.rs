//! Context Localizer
//!
//! Retrieval-augmented in-context classification for continuous indoor
//! localization.
//!
//! # Overview
//!
//! Instead of retraining a model per query, a pretrained in-context classifier
//! is conditioned on a small, freshly assembled set of historical labeled
//! windows for every batch of incoming sensor windows. The context mixes two
//! sources under a fixed budget:
//!
//! - **Temporal anchor**: the most recent windows of the training bank
//! - **Semantic retrieval**: the windows nearest to the batch under a learned
//!   NCA metric
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Context Localizer                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  source/        - Feature table loading and label encoding      │
//! │  preprocessing/ - Min-max scaling                               │
//! │  windowing/     - Sliding windows and chronological split       │
//! │  metric/        - NCA metric learning                           │
//! │  index          - Exact k-NN over the projected bank            │
//! │  context/       - Temporal anchor + semantic context assembly   │
//! │  classifier/    - In-context classifier services                │
//! │  inference      - Sequential batch loop, result log, progress   │
//! │  evaluation/    - Metrics and reports                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use context_localizer::prelude::*;
//!
//! let table = FeatureTable::load_npy("features.npy", "labels.npy", None)?;
//! let pipeline = PipelineBuilder::new().retrieval_k(1024).build()?;
//!
//! let mut classifier = KnnVoteClassifier::new(16);
//! let output = pipeline.run(&table, &mut classifier)?;
//! println!("accuracy {:.4}", output.metrics.accuracy);
//! ```

pub mod builder;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod index;
pub mod inference;
pub mod metric;
pub mod pipeline;
pub mod prelude;
pub mod preprocessing;
pub mod source;
pub mod windowing;

// Re-exports - Config
pub use builder::PipelineBuilder;
pub use config::{
    ClassifierConfig, DataConfig, ExperimentMetadata, InferenceConfig, MetricConfig,
    PipelineConfig, ReportConfig, RetrievalConfig, WindowConfig,
};

// Re-exports - Data
pub use preprocessing::MinMaxScaler;
pub use source::{FeatureTable, LabelEncoder};
pub use windowing::{LabeledWindows, TestQuery, TrainingBank, WindowBuilder};

// Re-exports - Retrieval
pub use context::{merge_context, ContextAssembler, ContextSet, RetrievalGranularity, TemporalAnchor};
pub use index::{KnnIndex, Neighbor};
pub use metric::{MetricProjection, NcaFit, NcaLearner, StopReason};

// Re-exports - Inference
pub use classifier::{
    ContextSnapshot, InContextClassifier, KnnVoteClassifier, ProcessClassifier,
};
pub use inference::{
    BatchRecord, InferenceLoop, InferenceOutput, LogProgress, ProgressCallback, ProgressInfo,
    ResultLog, RunFingerprint, RunShape,
};

// Re-exports - Evaluation
pub use evaluation::{ClassMetrics, ClassificationMetrics, ConfusionMatrix, EvaluationReport};

// Re-exports - Pipeline
pub use error::{LocalizerError, Result};
pub use pipeline::{Pipeline, PipelineOutput};
