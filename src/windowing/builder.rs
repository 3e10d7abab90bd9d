//! Window building over a scaled feature stream.
//!
//! # Layout
//!
//! Window `i` covers source rows `[i, i + window_size)` and is stored
//! timestep-major:
//!
//! ```text
//! [ row i feat 0..F | row i+1 feat 0..F | ... | row i+W-1 feat 0..F ]
//! ```
//!
//! Its label is `labels[i + window_size]`. A stream of length `L` yields
//! exactly `L - window_size` windows.

use crate::error::{LocalizerError, Result};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};

/// Builds next-step labeled sliding windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowBuilder {
    window_size: usize,
}

impl WindowBuilder {
    /// Create a builder for windows of `window_size` rows.
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    /// Configured window length.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of windows a stream of `stream_len` rows produces.
    pub fn window_count(&self, stream_len: usize) -> usize {
        stream_len.saturating_sub(self.window_size)
    }

    /// Build all windows in source order.
    ///
    /// Fails when the stream is not longer than the window, instead of
    /// returning an empty set.
    pub fn build(&self, stream: ArrayView2<'_, f64>, labels: &[usize]) -> Result<LabeledWindows> {
        if self.window_size == 0 {
            return Err(LocalizerError::config("window_size must be > 0"));
        }
        if stream.nrows() != labels.len() {
            return Err(LocalizerError::config(format!(
                "stream has {} rows but {} labels",
                stream.nrows(),
                labels.len()
            )));
        }
        if stream.nrows() <= self.window_size {
            return Err(LocalizerError::config(format!(
                "insufficient data: stream length {} must exceed window_size {}",
                stream.nrows(),
                self.window_size
            )));
        }

        let n_features = stream.ncols();
        let n_windows = self.window_count(stream.nrows());
        let width = self.window_size * n_features;

        let mut features = Array2::<f64>::zeros((n_windows, width));
        for (i, mut row) in features.axis_iter_mut(Axis(0)).enumerate() {
            let block = stream.slice(s![i..i + self.window_size, ..]);
            for (t, source_row) in block.axis_iter(Axis(0)).enumerate() {
                row.slice_mut(s![t * n_features..(t + 1) * n_features])
                    .assign(&source_row);
            }
        }

        let window_labels = labels[self.window_size..].to_vec();
        debug_assert_eq!(window_labels.len(), n_windows);

        Ok(LabeledWindows {
            features,
            labels: window_labels,
            window_size: self.window_size,
            n_features,
        })
    }
}

/// All windows of a stream, in temporal order.
#[derive(Debug, Clone)]
pub struct LabeledWindows {
    /// Flattened windows `[n_windows, window_size × n_features]`
    pub features: Array2<f64>,

    /// Next-step label per window
    pub labels: Vec<usize>,

    /// Rows per window
    pub window_size: usize,

    /// Features per source row
    pub n_features: usize,
}

impl LabeledWindows {
    /// Number of windows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no windows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Split at `floor(len × train_fraction)`: earlier windows become the
    /// training bank, later ones the test queries.
    pub fn split_chronological(self, train_fraction: f64) -> Result<(TrainingBank, TestQuery)> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(LocalizerError::config(format!(
                "train_fraction must be in (0, 1), got {train_fraction}"
            )));
        }

        let split = (self.len() as f64 * train_fraction) as usize;
        if split == 0 || split == self.len() {
            return Err(LocalizerError::config(format!(
                "split of {} windows at {train_fraction} leaves an empty side",
                self.len()
            )));
        }

        let bank = TrainingBank {
            features: self.features.slice(s![..split, ..]).to_owned(),
            labels: self.labels[..split].to_vec(),
        };
        let queries = TestQuery {
            features: self.features.slice(s![split.., ..]).to_owned(),
            labels: self.labels[split..].to_vec(),
        };

        Ok((bank, queries))
    }
}

/// Historical labeled windows available for retrieval.
///
/// Row position is the stable index used by the index and context sets.
#[derive(Debug, Clone)]
pub struct TrainingBank {
    /// Flattened window features, unprojected
    pub features: Array2<f64>,

    /// Labels aligned with `features`
    pub labels: Vec<usize>,
}

impl TrainingBank {
    /// Build a bank from parts.
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(LocalizerError::config(format!(
                "bank has {} rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the bank is empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Width of each entry.
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    /// Features of one entry.
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }
}

/// Test windows, consumed batch by batch in temporal order.
#[derive(Debug, Clone)]
pub struct TestQuery {
    /// Flattened window features, unprojected
    pub features: Array2<f64>,

    /// Ground-truth labels (used only for evaluation)
    pub labels: Vec<usize>,
}

impl TestQuery {
    /// Number of test windows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no test windows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of batches of `batch_size`, last one possibly partial.
    pub fn batch_count(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            return 0;
        }
        self.len().div_ceil(batch_size)
    }

    /// Row range `[start, end)` of batch `b`.
    pub fn batch_bounds(&self, b: usize, batch_size: usize) -> (usize, usize) {
        let start = (b * batch_size).min(self.len());
        let end = ((b + 1) * batch_size).min(self.len());
        (start, end)
    }

    /// Features of batch `b`.
    pub fn batch(&self, b: usize, batch_size: usize) -> ArrayView2<'_, f64> {
        let (start, end) = self.batch_bounds(b, batch_size);
        self.features.slice(s![start..end, ..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stream where row `r` holds `[r, r + 0.5]` so windows are easy to read.
    fn ramp(len: usize) -> (Array2<f64>, Vec<usize>) {
        let stream = Array2::from_shape_fn((len, 2), |(r, c)| r as f64 + c as f64 * 0.5);
        let labels = (0..len).map(|r| r % 3).collect();
        (stream, labels)
    }

    #[test]
    fn test_window_count_and_layout() {
        let (stream, labels) = ramp(115);
        let windows = WindowBuilder::new(10).build(stream.view(), &labels).unwrap();

        assert_eq!(windows.len(), 105);
        assert_eq!(windows.features.ncols(), 20);

        // Window 0 covers rows [0, 10), label from row 10
        let w0 = windows.features.row(0);
        assert_eq!(w0[0], 0.0);
        assert_eq!(w0[1], 0.5);
        assert_eq!(w0[18], 9.0);
        assert_eq!(w0[19], 9.5);
        assert_eq!(windows.labels[0], labels[10]);

        // Last window covers rows [104, 114), label from row 114
        let last = windows.features.row(104);
        assert_eq!(last[0], 104.0);
        assert_eq!(last[18], 113.0);
        assert_eq!(windows.labels[104], labels[114]);
    }

    #[test]
    fn test_insufficient_data() {
        let (stream, labels) = ramp(10);
        let err = WindowBuilder::new(10).build(stream.view(), &labels).unwrap_err();
        assert!(matches!(err, LocalizerError::Configuration(_)));

        let (stream, labels) = ramp(11);
        let windows = WindowBuilder::new(10).build(stream.view(), &labels).unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_zero_window_rejected() {
        let (stream, labels) = ramp(5);
        assert!(WindowBuilder::new(0).build(stream.view(), &labels).is_err());
    }

    #[test]
    fn test_split_preserves_order() {
        let (stream, labels) = ramp(60);
        let windows = WindowBuilder::new(10).build(stream.view(), &labels).unwrap();
        let (bank, queries) = windows.split_chronological(0.8).unwrap();

        assert_eq!(bank.len(), 40);
        assert_eq!(queries.len(), 10);
        // First query window starts right after the last bank window
        assert_eq!(bank.row(39)[0], 39.0);
        assert_eq!(queries.features.row(0)[0], 40.0);
    }

    #[test]
    fn test_split_rejects_empty_side() {
        // A single window cannot be split into two non-empty sides
        let (stream, labels) = ramp(11);
        let windows = WindowBuilder::new(10).build(stream.view(), &labels).unwrap();
        assert!(windows.clone().split_chronological(0.8).is_err());
        assert!(windows.split_chronological(1.0).is_err());
    }

    #[test]
    fn test_batches() {
        let queries = TestQuery {
            features: Array2::zeros((7, 2)),
            labels: vec![0; 7],
        };
        assert_eq!(queries.batch_count(3), 3);
        assert_eq!(queries.batch_bounds(2, 3), (6, 7));
        assert_eq!(queries.batch(2, 3).nrows(), 1);
    }
}
