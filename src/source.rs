//! Feature/label source.
//!
//! The pipeline consumes a pre-cleaned, time-ordered, fully numeric table: one
//! row per sensor reading, one label per row. Ingesting raw spreadsheets and
//! cleaning columns happens upstream; this module only loads the result from
//! NumPy files and validates it.
//!
//! # File layout
//!
//! | File | Shape | Type |
//! |------|-------|------|
//! | features | `[rows, features]` | `f64` |
//! | labels | `[rows]` | `i64` |
//! | class names (optional) | JSON array of strings | one per distinct label |
//!
//! Class names are listed in ascending order of the raw label values.

use crate::error::{LocalizerError, Result};
use ndarray::{Array1, Array2};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

/// Maps raw integer labels to contiguous class indices `0..n_classes`.
///
/// Classes are the sorted unique raw values, so the mapping does not depend
/// on the order labels appear in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<i64>,
    names: Vec<String>,
}

impl LabelEncoder {
    /// Learn the class set from raw labels.
    pub fn fit(raw: &[i64]) -> Result<Self> {
        if raw.is_empty() {
            return Err(LocalizerError::config("label column is empty"));
        }
        let mut classes = raw.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let names = classes.iter().map(|c| c.to_string()).collect();
        Ok(Self { classes, names })
    }

    /// Attach human-readable class names (one per class, ascending raw order).
    pub fn with_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.classes.len() {
            return Err(LocalizerError::config(format!(
                "{} class names supplied for {} distinct labels",
                names.len(),
                self.classes.len()
            )));
        }
        self.names = names;
        Ok(self)
    }

    /// Encode raw labels. Unknown labels are a configuration error.
    pub fn transform(&self, raw: &[i64]) -> Result<Vec<usize>> {
        raw.iter()
            .map(|label| {
                self.classes.binary_search(label).map_err(|_| {
                    LocalizerError::config(format!("label {label} was not seen when fitting"))
                })
            })
            .collect()
    }

    /// Decode a class index back to its raw label.
    pub fn inverse_transform(&self, class: usize) -> Option<i64> {
        self.classes.get(class).copied()
    }

    /// Number of distinct classes.
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Display names, indexed by class.
    pub fn class_names(&self) -> &[String] {
        &self.names
    }
}

/// Validated, encoded feature table.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Raw (unscaled) features `[rows, features]`
    pub features: Array2<f64>,

    /// Encoded labels, one per row
    pub labels: Vec<usize>,

    /// Label encoder used to produce `labels`
    pub encoder: LabelEncoder,
}

impl FeatureTable {
    /// Build a table from in-memory arrays.
    pub fn new(features: Array2<f64>, raw_labels: &[i64]) -> Result<Self> {
        if features.nrows() == 0 {
            return Err(LocalizerError::config("source table has no rows"));
        }
        if features.ncols() == 0 {
            return Err(LocalizerError::config("source table has no usable feature columns"));
        }
        if features.nrows() != raw_labels.len() {
            return Err(LocalizerError::config(format!(
                "feature rows ({}) and labels ({}) differ in length",
                features.nrows(),
                raw_labels.len()
            )));
        }
        if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
            let (row, col) = (pos / features.ncols(), pos % features.ncols());
            return Err(LocalizerError::config(format!(
                "non-finite feature value at row {row}, column {col}"
            )));
        }

        let encoder = LabelEncoder::fit(raw_labels)?;
        let labels = encoder.transform(raw_labels)?;

        Ok(Self {
            features,
            labels,
            encoder,
        })
    }

    /// Load a table from `.npy` files plus optional JSON class names.
    pub fn load_npy<P: AsRef<Path>>(
        features_path: P,
        labels_path: P,
        class_names_path: Option<P>,
    ) -> Result<Self> {
        let features_path = features_path.as_ref();
        let labels_path = labels_path.as_ref();

        for path in [features_path, labels_path] {
            if !path.exists() {
                return Err(LocalizerError::config(format!(
                    "source file {} does not exist",
                    path.display()
                )));
            }
        }

        let features = Array2::<f64>::read_npy(File::open(features_path)?)?;
        let labels = Array1::<i64>::read_npy(File::open(labels_path)?)?;
        log::info!(
            "Loaded {} rows x {} features from {}",
            features.nrows(),
            features.ncols(),
            features_path.display()
        );

        let mut table = Self::new(features, &labels.to_vec())?;

        if let Some(names_path) = class_names_path {
            let contents = fs::read_to_string(names_path.as_ref())?;
            let names: Vec<String> = serde_json::from_str(&contents)?;
            table.encoder = table.encoder.with_names(names)?;
        }

        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// Whether the table has no rows (never true for a validated table).
    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of distinct classes.
    pub fn n_classes(&self) -> usize {
        self.encoder.n_classes()
    }
}
