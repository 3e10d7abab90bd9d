//! Pipeline configuration management.
//!
//! This module provides unified configuration for the whole localization
//! pipeline, with serialization support for experiment reproducibility.
//!
//! # Features
//!
//! - **Unified Configuration**: Single struct combining all pipeline stages
//! - **Serialization**: Save/load configurations to TOML or JSON
//! - **Validation**: Ensure configurations are valid before use
//! - **Reproducibility**: The seed and every budget live in one file
//!
//! # Example
//!
//! ```ignore
//! use context_localizer::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! config.save_toml("experiment.toml")?;
//!
//! let loaded = PipelineConfig::load_toml("experiment.toml")?;
//! let pipeline = Pipeline::from_config(loaded)?;
//! ```
//!
//! # Sample TOML
//!
//! ```toml
//! [window]
//! window_size = 10
//! train_fraction = 0.8
//!
//! [retrieval]
//! retrieval_k = 2048
//! temporal_ratio = 0.5
//! granularity = "batch_centroid"
//!
//! [metric]
//! nca_components = 16
//! random_seed = 42
//!
//! [inference]
//! batch_size = 50
//! release_every = 10
//!
//! [classifier]
//! backend = "knn_vote"
//! k = 16
//! ```

use crate::context::RetrievalGranularity;
use crate::error::{LocalizerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Unified pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input table locations (optional - tables can be passed programmatically)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DataConfig>,

    /// Windowing and train/test split
    pub window: WindowConfig,

    /// Context budget and retrieval policy
    pub retrieval: RetrievalConfig,

    /// Metric learning
    pub metric: MetricConfig,

    /// Inference loop
    pub inference: InferenceConfig,

    /// Classifier service backend
    pub classifier: ClassifierConfig,

    /// Report output
    pub report: ReportConfig,

    /// Experiment metadata (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExperimentMetadata>,
}

/// Locations of the pre-cleaned input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// `[rows, features]` f64 array
    pub features_path: PathBuf,

    /// `[rows]` i64 array
    pub labels_path: PathBuf,

    /// JSON array of class names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_names_path: Option<PathBuf>,
}

/// Windowing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Consecutive readings per window
    pub window_size: usize,

    /// Leading fraction of windows forming the training bank
    pub train_fraction: f64,
}

/// Context assembly configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Total context budget
    pub retrieval_k: usize,

    /// Fraction of the budget reserved for the temporal anchor
    pub temporal_ratio: f64,

    /// Semantic retrieval granularity
    pub granularity: RetrievalGranularity,
}

/// Metric learning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Projection dimensionality
    pub nca_components: usize,

    /// Gradient iterations cap
    pub max_iterations: usize,

    /// Initial step size (adapted during the fit)
    pub learning_rate: f64,

    /// Stop when the relative objective gain drops below this
    pub tolerance: f64,

    /// Bank rows used for fitting; larger banks are subsampled (0 = no cap)
    pub max_fit_samples: usize,

    /// Seed for initialization and subsampling
    pub random_seed: u64,
}

/// Inference loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Test windows per batch
    pub batch_size: usize,

    /// Release classifier memory after this many batches
    pub release_every: usize,

    /// Append-only log of completed batches, enables resuming
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_log: Option<PathBuf>,
}

/// Classifier service backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Built-in distance-weighted k-NN vote over the context
    KnnVote {
        /// Voting neighbors
        k: usize,
    },

    /// External service process speaking JSON lines on stdin/stdout
    Process {
        /// Executable
        command: String,

        /// Arguments
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Report configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Human-readable report
    pub output_path: PathBuf,

    /// Optional JSON dump of the same metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path: Option<PathBuf>,

    /// Report heading
    pub title: String,

    /// Optional `.npy` export of the fitted projection matrix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_path: Option<PathBuf>,
}

/// Experiment metadata for tracking and reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    /// Experiment name
    pub name: String,

    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creation timestamp (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Version or git commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Custom tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            train_fraction: 0.8,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 2048,
            temporal_ratio: 0.5, // half anchor, half semantic
            granularity: RetrievalGranularity::BatchCentroid,
        }
    }
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            nca_components: 16,
            max_iterations: 50,
            learning_rate: 0.1,
            tolerance: 1e-5,
            max_fit_samples: 2000,
            random_seed: 42,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            release_every: 10,
            result_log: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::KnnVote { k: 16 }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("results.txt"),
            json_path: None,
            title: "Hybrid Temporal + Metric Retrieval Results".to_string(),
            projection_path: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set experiment metadata.
    pub fn with_metadata(mut self, metadata: ExperimentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set input table locations.
    pub fn with_data(mut self, data: DataConfig) -> Self {
        self.data = Some(data);
        self
    }

    /// Validate the configuration.
    ///
    /// Returns Ok(()) if valid, Err(msg) otherwise.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.window.validate()?;
        self.retrieval.validate()?;
        self.metric.validate()?;
        self.inference.validate()?;
        self.classifier.validate()?;
        Ok(())
    }

    /// Validate, converting failures into a configuration error.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(LocalizerError::Configuration)
    }

    /// Save configuration to TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load and validate configuration from TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string)?;
        Ok(())
    }

    /// Load and validate configuration from JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }
}

impl WindowConfig {
    /// Validate windowing configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.window_size == 0 {
            return Err("window_size must be > 0".to_string());
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            ));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    /// Validate retrieval configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.retrieval_k == 0 {
            return Err("retrieval_k must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.temporal_ratio) {
            return Err(format!(
                "temporal_ratio must be in [0, 1], got {}",
                self.temporal_ratio
            ));
        }
        Ok(())
    }

    /// Anchor size: `floor(retrieval_k × temporal_ratio)`.
    pub fn n_temporal(&self) -> usize {
        (self.retrieval_k as f64 * self.temporal_ratio) as usize
    }

    /// Semantic neighbors per query: `floor(retrieval_k × (1 − temporal_ratio))`.
    pub fn k_semantic(&self) -> usize {
        (self.retrieval_k as f64 * (1.0 - self.temporal_ratio)) as usize
    }
}

impl MetricConfig {
    /// Validate metric learning configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.nca_components == 0 {
            return Err("nca_components must be > 0".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err("learning_rate must be a positive number".to_string());
        }
        if !(self.tolerance >= 0.0) {
            return Err("tolerance must be >= 0".to_string());
        }
        if self.max_fit_samples == 1 {
            return Err("max_fit_samples must be 0 (no cap) or >= 2".to_string());
        }
        Ok(())
    }
}

impl InferenceConfig {
    /// Validate inference configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.release_every == 0 {
            return Err("release_every must be > 0".to_string());
        }
        Ok(())
    }
}

impl ClassifierConfig {
    /// Validate classifier configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::KnnVote { k } if *k == 0 => Err("knn_vote k must be > 0".to_string()),
            Self::Process { command, .. } if command.trim().is_empty() => {
                Err("process backend requires a command".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.window_size, 10);
        assert_eq!(config.retrieval.retrieval_k, 2048);
        assert_eq!(config.metric.nca_components, 16);
        assert_eq!(config.inference.batch_size, 50);
        assert_eq!(config.metric.random_seed, 42);
    }

    #[test]
    fn test_budget_split() {
        let mut retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.n_temporal(), 1024);
        assert_eq!(retrieval.k_semantic(), 1024);

        retrieval.retrieval_k = 10;
        retrieval.temporal_ratio = 1.0;
        assert_eq!(retrieval.n_temporal(), 10);
        assert_eq!(retrieval.k_semantic(), 0);

        retrieval.temporal_ratio = 0.0;
        assert_eq!(retrieval.n_temporal(), 0);
        assert_eq!(retrieval.k_semantic(), 10);
    }

    #[test]
    fn test_save_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = PipelineConfig::default()
            .with_metadata(ExperimentMetadata {
                name: "hybrid_k512".to_string(),
                description: Some("Half anchor, half NCA".to_string()),
                created_at: None,
                version: Some("0.1.0".to_string()),
                tags: Some(vec!["test".to_string()]),
            })
            .with_data(DataConfig {
                features_path: PathBuf::from("data/features.npy"),
                labels_path: PathBuf::from("data/labels.npy"),
                class_names_path: None,
            });
        config.retrieval.retrieval_k = 512;
        config.retrieval.granularity = RetrievalGranularity::PerSample;
        config.classifier = ClassifierConfig::Process {
            command: "python3".to_string(),
            args: vec!["serve.py".to_string()],
        };

        config.save_toml(&path).unwrap();
        let loaded = PipelineConfig::load_toml(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = PipelineConfig::default();
        config.save_json(&path).unwrap();
        let loaded = PipelineConfig::load_json(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [retrieval]
            retrieval_k = 64

            [classifier]
            backend = "knn_vote"
            k = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.retrieval_k, 64);
        assert_eq!(config.retrieval.temporal_ratio, 0.5);
        assert_eq!(config.window.window_size, 10);
        assert_eq!(config.classifier, ClassifierConfig::KnnVote { k: 5 });
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PipelineConfig::default();
        config.retrieval.temporal_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.window.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.inference.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.classifier = ClassifierConfig::Process {
            command: " ".to_string(),
            args: Vec::new(),
        };
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.window.train_fraction = 1.0;
        assert!(matches!(config.check(), Err(LocalizerError::Configuration(_))));
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[inference]\nbatch_size = 0\n").unwrap();
        assert!(PipelineConfig::load_toml(&path).is_err());
    }
}
