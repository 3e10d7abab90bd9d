//! Feature preprocessing applied to the raw table before windowing.
//!
//! - **Scaling**: per-feature min-max scaling to `[0, 1]`
//!
//! # Example
//!
//! ```
//! use context_localizer::preprocessing::MinMaxScaler;
//! use ndarray::array;
//!
//! let raw = array![[0.0, 10.0], [5.0, 20.0], [10.0, 30.0]];
//! let scaler = MinMaxScaler::fit(raw.view()).unwrap();
//! let scaled = scaler.transform(raw.view()).unwrap();
//! assert_eq!(scaled[[1, 0]], 0.5);
//! assert_eq!(scaled[[2, 1]], 1.0);
//! ```

pub mod scaling;

pub use scaling::MinMaxScaler;
