//! Human-readable and JSON result reports.

use super::ClassificationMetrics;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const RULE: &str = "═══════════════════════════════════════════════════════════════";

/// Metrics plus the run settings that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Report heading
    pub title: String,

    /// RFC 3339 creation time
    pub generated_at: String,

    /// Run settings, in insertion order
    pub settings: Vec<(String, String)>,

    /// Scores
    pub metrics: ClassificationMetrics,
}

impl EvaluationReport {
    /// Create a report stamped with the current time.
    pub fn new(title: impl Into<String>, metrics: ClassificationMetrics) -> Self {
        Self {
            title: title.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            settings: Vec::new(),
            metrics,
        }
    }

    /// Record a run setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.settings.push((key.into(), value.to_string()));
        self
    }

    /// Render the text report.
    pub fn render(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "Generated: {}", self.generated_at);
        if !self.settings.is_empty() {
            let width = self.settings.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            let _ = writeln!(out);
            let _ = writeln!(out, "Settings");
            for (key, value) in &self.settings {
                let _ = writeln!(out, "  {key:<width$}  {value}");
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Overall ({} predictions)", m.n_samples);
        let rows = [
            ("Accuracy", m.accuracy),
            ("F1 (weighted)", m.f1_weighted),
            ("F1 (macro)", m.f1_macro),
            ("Precision (weighted)", m.precision_weighted),
            ("Recall (weighted)", m.recall_weighted),
            ("Recall (macro)", m.recall_macro),
            ("Balanced accuracy", m.balanced_accuracy),
            ("MCC", m.mcc),
        ];
        for (label, value) in rows {
            let _ = writeln!(out, "  {:<22}{value:.4}", format!("{label}:"));
        }

        let name_width = m
            .per_class
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("class".len());
        let _ = writeln!(out);
        let _ = writeln!(out, "Per-class");
        let _ = writeln!(
            out,
            "  {:<name_width$}  {:>9}  {:>9}  {:>9}  {:>7}",
            "class", "precision", "recall", "f1", "support"
        );
        for c in &m.per_class {
            let _ = writeln!(
                out,
                "  {:<name_width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>7}",
                c.name, c.precision, c.recall, c.f1, c.support
            );
        }
        let _ = writeln!(out, "{RULE}");
        out
    }

    /// Write the text report.
    pub fn write_text<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    /// Write the report as pretty JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
