//! Sliding-window construction and chronological splitting.
//!
//! A window is `window_size` consecutive feature rows flattened into one row
//! of length `window_size × n_features`, labeled with the row that follows it
//! (next-step prediction). Windows keep source order; the first
//! `train_fraction` of them form the training bank and the rest are the test
//! queries. Nothing is shuffled.
//!
//! # Example
//!
//! ```
//! use context_localizer::windowing::WindowBuilder;
//! use ndarray::Array2;
//!
//! let stream = Array2::<f64>::zeros((115, 3));
//! let labels = vec![0usize; 115];
//!
//! let windows = WindowBuilder::new(10).build(stream.view(), &labels).unwrap();
//! assert_eq!(windows.len(), 105);
//! assert_eq!(windows.features.ncols(), 30);
//!
//! let (bank, queries) = windows.split_chronological(0.8).unwrap();
//! assert_eq!(bank.len(), 84);
//! assert_eq!(queries.len(), 21);
//! ```

mod builder;

pub use builder::{LabeledWindows, TestQuery, TrainingBank, WindowBuilder};
