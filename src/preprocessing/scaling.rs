//! Column-wise min-max scaling.
//!
//! Scales every feature column to `[0, 1]`:
//! ```text
//! scaled[i,j] = (x[i,j] - min[j]) / (max[j] - min[j])
//! ```
//!
//! Constant columns (`max == min`) map to `0.0` instead of dividing by zero.
//! Values outside the fitted range are clamped, so transformed data is always
//! bounded even when applied to rows the scaler was not fitted on.

use crate::error::{LocalizerError, Result};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature min-max scaler fitted on a feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit column minima and maxima.
    ///
    /// Fails on an empty table or non-finite values.
    pub fn fit(features: ArrayView2<'_, f64>) -> Result<Self> {
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(LocalizerError::config(format!(
                "cannot fit scaler on empty table ({} rows x {} columns)",
                features.nrows(),
                features.ncols()
            )));
        }

        let mut min = vec![f64::INFINITY; features.ncols()];
        let mut max = vec![f64::NEG_INFINITY; features.ncols()];

        for row in features.axis_iter(Axis(0)) {
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(LocalizerError::config(format!(
                        "non-finite value {v} in feature column {j}"
                    )));
                }
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }

        Ok(Self { min, max })
    }

    /// Fit and transform in one step.
    pub fn fit_transform(features: ArrayView2<'_, f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(features)?;
        let scaled = scaler.transform(features)?;
        Ok((scaler, scaled))
    }

    /// Scale a table with the fitted bounds.
    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.n_features() {
            return Err(LocalizerError::config(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                features.ncols()
            )));
        }

        let mut scaled = features.to_owned();
        for mut row in scaled.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.scale_value(j, *v);
            }
        }
        Ok(scaled)
    }

    #[inline]
    fn scale_value(&self, column: usize, value: f64) -> f64 {
        let range = self.max[column] - self.min[column];
        if range <= f64::EPSILON {
            return 0.0;
        }
        ((value - self.min[column]) / range).clamp(0.0, 1.0)
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Fitted column minima.
    pub fn min(&self) -> &[f64] {
        &self.min
    }

    /// Fitted column maxima.
    pub fn max(&self) -> &[f64] {
        &self.max
    }
}
