//! Error types for the localization pipeline.
//!
//! Every variant names the stage that failed so a fatal condition produces a
//! clear diagnostic. Plumbing errors (I/O, npy, JSON, TOML) convert via `?`.

use thiserror::Error;

/// Pipeline error.
#[derive(Error, Debug)]
pub enum LocalizerError {
    /// Invalid source table or configuration, detected before any loop starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Metric learner fit failed; raised before the index is built.
    #[error("metric fitting error: {0}")]
    Fitting(String),

    /// A batch failed during context assembly or classification.
    #[error("inference error in batch {batch}: {message}")]
    Inference {
        /// Index of the batch that raised.
        batch: usize,
        /// What went wrong.
        message: String,
    },

    /// The classifier service could not be initialized.
    #[error("classifier service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reading a `.npy` array.
    #[error("npy read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    /// Failure writing a `.npy` array.
    #[error("npy write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization failure.
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl LocalizerError {
    /// Shorthand for a [`LocalizerError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for a [`LocalizerError::Fitting`].
    pub fn fitting(msg: impl Into<String>) -> Self {
        Self::Fitting(msg.into())
    }

    /// Shorthand for a [`LocalizerError::Inference`].
    pub fn inference(batch: usize, msg: impl Into<String>) -> Self {
        Self::Inference {
            batch,
            message: msg.into(),
        }
    }

    /// Name of the stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::TomlDe(_) | Self::TomlSer(_) => "configuration",
            Self::Fitting(_) => "metric-fitting",
            Self::Inference { .. } => "inference",
            Self::ServiceUnavailable(_) => "classifier-init",
            Self::Io(_) | Self::NpyRead(_) | Self::NpyWrite(_) | Self::Json(_) => "io",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LocalizerError>;
