//! Scoring of the ordered predictions against ground truth.
//!
//! - [`ClassificationMetrics`]: accuracy, weighted/macro F1, weighted
//!   precision, recall, balanced accuracy, MCC and a per-class breakdown
//! - [`EvaluationReport`]: text and JSON artifacts
//!
//! # Example
//!
//! ```
//! use context_localizer::evaluation::ClassificationMetrics;
//!
//! let names = vec!["lab".to_string(), "office".to_string()];
//! let metrics = ClassificationMetrics::compute(&[0, 1, 1], &[0, 1, 1], &names).unwrap();
//! assert_eq!(metrics.accuracy, 1.0);
//! ```

mod metrics;
mod report;

pub use metrics::{ClassMetrics, ClassificationMetrics, ConfusionMatrix};
pub use report::EvaluationReport;
