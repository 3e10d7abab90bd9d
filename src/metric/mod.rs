//! Supervised metric learning.
//!
//! The learned space is used only to measure similarity for retrieval; the
//! classifier always sees the original window features.
//!
//! - [`NcaLearner`]: fits a neighborhood-components projection
//! - [`MetricProjection`]: the fitted, immutable linear map
//!
//! # Example
//!
//! ```ignore
//! use context_localizer::metric::NcaLearner;
//!
//! let fit = NcaLearner::new(config.metric.clone()).fit(bank.features.view(), &bank.labels)?;
//! let projected_bank = fit.projection.transform(bank.features.view())?;
//! ```

pub mod nca;

pub use nca::{NcaFit, NcaLearner, StopReason};

use crate::error::{LocalizerError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_npy::WriteNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Fitted linear projection `x ↦ A x`, `A` of shape `[n_components, input_dim]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProjection {
    components: Array2<f64>,
}

impl MetricProjection {
    /// Wrap a projection matrix.
    pub fn new(components: Array2<f64>) -> Self {
        Self { components }
    }

    /// Projection matrix.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Output dimension.
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Expected input width.
    pub fn input_dim(&self) -> usize {
        self.components.ncols()
    }

    /// Project every row of `features`.
    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.input_dim() {
            return Err(LocalizerError::config(format!(
                "projection expects {} input features, got {}",
                self.input_dim(),
                features.ncols()
            )));
        }
        Ok(features.dot(&self.components.t()))
    }

    /// Project a single row.
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if row.len() != self.input_dim() {
            return Err(LocalizerError::config(format!(
                "projection expects {} input features, got {}",
                self.input_dim(),
                row.len()
            )));
        }
        Ok(self.components.dot(&row))
    }

    /// Element-wise mean of the projected rows.
    pub fn centroid(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let projected = self.transform(features)?;
        projected
            .mean_axis(Axis(0))
            .ok_or_else(|| LocalizerError::config("cannot take the centroid of an empty batch"))
    }

    /// Write the projection matrix as `.npy`.
    pub fn save_npy<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.components.write_npy(File::create(path)?)?;
        Ok(())
    }
}
