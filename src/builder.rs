//! Fluent builder for pipeline configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! use context_localizer::PipelineBuilder;
//!
//! let pipeline = PipelineBuilder::new().build()?;
//! let output = pipeline.run(&table, &mut classifier)?;
//! ```
//!
//! # Budget Reference
//!
//! | `retrieval_k` | `temporal_ratio` | Anchor | Semantic `k` |
//! |---------------|------------------|--------|--------------|
//! | 2048 | 0.5 | 1024 | 1024 |
//! | 1024 | 0.25 | 256 | 768 |
//! | 512 | 1.0 | 512 | 0 (temporal only) |
//! | 512 | 0.0 | 0 | 512 (semantic only) |
//!
//! # Common Configurations
//!
//! ## Temporal-only baseline
//!
//! ```ignore
//! let pipeline = PipelineBuilder::new()
//!     .retrieval_k(1024)
//!     .temporal_ratio(1.0)
//!     .build()?;
//! ```
//!
//! ## Per-window retrieval with an external service
//!
//! ```ignore
//! let pipeline = PipelineBuilder::new()
//!     .granularity(RetrievalGranularity::PerSample)
//!     .process_classifier("python3", &["serve_classifier.py"])
//!     .result_log("runs/per_sample.jsonl")
//!     .build()?;
//! ```

use crate::config::{ClassifierConfig, ExperimentMetadata, PipelineConfig};
use crate::context::RetrievalGranularity;
use crate::error::{LocalizerError, Result};
use crate::pipeline::Pipeline;
use std::path::PathBuf;

/// Fluent builder for creating pipeline configurations.
///
/// Starts from [`PipelineConfig::default`]; the configuration is validated
/// before building.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Create a new pipeline builder with default settings.
    ///
    /// Default configuration:
    /// - Window size 10, 80/20 chronological split
    /// - Budget 2048, half temporal anchor, batch-centroid retrieval
    /// - 16 NCA components, seed 42
    /// - Batches of 50, built-in k-NN vote classifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    // =========================================================================
    // Windowing
    // =========================================================================

    /// Readings per window.
    pub fn window_size(mut self, window_size: usize) -> Self {
        self.config.window.window_size = window_size;
        self
    }

    /// Fraction of windows used as the training bank.
    pub fn train_fraction(mut self, fraction: f64) -> Self {
        self.config.window.train_fraction = fraction;
        self
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Total context budget.
    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.config.retrieval.retrieval_k = k;
        self
    }

    /// Share of the budget held by the temporal anchor.
    pub fn temporal_ratio(mut self, ratio: f64) -> Self {
        self.config.retrieval.temporal_ratio = ratio;
        self
    }

    /// Semantic retrieval granularity.
    pub fn granularity(mut self, granularity: RetrievalGranularity) -> Self {
        self.config.retrieval.granularity = granularity;
        self
    }

    // =========================================================================
    // Metric
    // =========================================================================

    /// Projection dimensionality.
    pub fn nca_components(mut self, components: usize) -> Self {
        self.config.metric.nca_components = components;
        self
    }

    /// Gradient iteration cap for the metric fit.
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.config.metric.max_iterations = iterations;
        self
    }

    /// Bank rows used for the metric fit (0 = all).
    pub fn max_fit_samples(mut self, samples: usize) -> Self {
        self.config.metric.max_fit_samples = samples;
        self
    }

    /// Seed for every random choice.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.metric.random_seed = seed;
        self
    }

    // =========================================================================
    // Inference
    // =========================================================================

    /// Test windows per batch.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.inference.batch_size = batch_size;
        self
    }

    /// Release classifier memory every N batches.
    pub fn release_every(mut self, batches: usize) -> Self {
        self.config.inference.release_every = batches;
        self
    }

    /// Persist completed batches so an interrupted run can resume.
    pub fn result_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.inference.result_log = Some(path.into());
        self
    }

    /// Use the built-in k-NN vote classifier.
    pub fn knn_classifier(mut self, k: usize) -> Self {
        self.config.classifier = ClassifierConfig::KnnVote { k };
        self
    }

    /// Use an external classifier service.
    pub fn process_classifier(mut self, command: &str, args: &[&str]) -> Self {
        self.config.classifier = ClassifierConfig::Process {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        self
    }

    // =========================================================================
    // Report
    // =========================================================================

    /// Text report location.
    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.report.output_path = path.into();
        self
    }

    /// Also write the report as JSON.
    pub fn json_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.report.json_path = Some(path.into());
        self
    }

    /// Set experiment name and description.
    pub fn experiment(mut self, name: &str, description: &str) -> Self {
        self.config.metadata = Some(ExperimentMetadata {
            name: name.to_string(),
            description: Some(description.to_string()),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            version: None,
            tags: None,
        });
        self
    }

    /// Set experiment metadata with full control.
    pub fn with_metadata(mut self, metadata: ExperimentMetadata) -> Self {
        self.config.metadata = Some(metadata);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Build the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build_config(self) -> std::result::Result<PipelineConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build and return a ready-to-use Pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.build_config().map_err(LocalizerError::Configuration)?;
        Pipeline::from_config(config)
    }

    /// Get a summary of the current configuration.
    pub fn summary(&self) -> String {
        let c = &self.config;
        let classifier = match &c.classifier {
            ClassifierConfig::KnnVote { k } => format!("k-NN vote (k = {k})"),
            ClassifierConfig::Process { command, .. } => format!("process `{command}`"),
        };
        format!(
            "PipelineBuilder Summary:\n\
             - Window: {} readings, train fraction {}\n\
             - Budget: {} ({} anchor + {} semantic, {:?})\n\
             - Metric: {} components, seed {}\n\
             - Batches: {} (release every {})\n\
             - Classifier: {}",
            c.window.window_size,
            c.window.train_fraction,
            c.retrieval.retrieval_k,
            c.retrieval.n_temporal(),
            c.retrieval.k_semantic(),
            c.retrieval.granularity,
            c.metric.nca_components,
            c.metric.random_seed,
            c.inference.batch_size,
            c.inference.release_every,
            classifier,
        )
    }
}
