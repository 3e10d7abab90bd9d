//! Neighborhood components analysis.
//!
//! Learns a linear map `A` (`n_components × d`) that maximizes the expected
//! number of training points whose stochastic nearest neighbor shares their
//! label:
//!
//! ```text
//! p_ij = exp(-‖A x_i − A x_j‖²) / Σ_{k≠i} exp(-‖A x_i − A x_k‖²),   p_ii = 0
//! f(A) = Σ_i Σ_{j: y_j = y_i} p_ij
//! ```
//!
//! With `W_ij = p_ij ([y_i = y_j] − p_i)` and `p_i = Σ_{j: y_j = y_i} p_ij`,
//! the gradient is
//!
//! ```text
//! ∂f/∂A = 2 Zᵀ (W + Wᵀ − diag(colsum W)) X,   Z = X Aᵀ
//! ```
//!
//! Optimization is plain gradient ascent with an adaptive step: accepted steps
//! grow the step by 10%, rejected steps halve it. Per-row softmax work runs on
//! rayon but rows are collected in order and summed sequentially, so a fit is
//! bit-reproducible for a given seed.

use crate::config::MetricConfig;
use crate::error::{LocalizerError, Result};
use crate::metric::MetricProjection;
use ndarray::{Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Smallest step before the optimizer gives up on further progress.
const MIN_STEP: f64 = 1e-12;

/// Step growth after an accepted update.
const STEP_GROWTH: f64 = 1.1;

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Relative objective gain fell below the tolerance
    Converged,

    /// Every step was rejected until the step size vanished
    StepUnderflow,

    /// Iteration cap reached
    MaxIterations,
}

/// Outcome of a fit.
#[derive(Debug, Clone)]
pub struct NcaFit {
    /// Learned projection
    pub projection: MetricProjection,

    /// Final objective, normalized to `[0, 1]` (mean same-label probability)
    pub objective: f64,

    /// Objective of the random initialization
    pub initial_objective: f64,

    /// Gradient iterations run
    pub iterations: usize,

    /// Whether the tolerance criterion stopped the fit
    pub converged: bool,

    /// What ended the optimization
    pub stop: StopReason,

    /// Number of bank rows the fit used
    pub fit_samples: usize,
}

/// Supervised metric learner.
#[derive(Debug, Clone)]
pub struct NcaLearner {
    config: MetricConfig,
}

impl NcaLearner {
    /// Create a learner.
    pub fn new(config: MetricConfig) -> Self {
        Self { config }
    }

    /// Learner configuration.
    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Fit a projection on `features` / `labels`.
    pub fn fit(&self, features: ArrayView2<'_, f64>, labels: &[usize]) -> Result<NcaFit> {
        let n = features.nrows();
        let d = features.ncols();

        if n == 0 || d == 0 {
            return Err(LocalizerError::fitting("cannot fit on an empty training bank"));
        }
        if labels.len() != n {
            return Err(LocalizerError::fitting(format!(
                "{n} feature rows but {} labels",
                labels.len()
            )));
        }
        let n_components = self.config.nca_components;
        if n_components == 0 || n_components > d {
            return Err(LocalizerError::config(format!(
                "nca_components must be in 1..={d}, got {n_components}"
            )));
        }
        check_class_count(labels)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_seed);

        let rows = self.subsample_rows(labels, &mut rng);
        let (x, y) = match &rows {
            Some(rows) => (
                features.select(Axis(0), rows),
                rows.iter().map(|&r| labels[r]).collect::<Vec<_>>(),
            ),
            None => (features.to_owned(), labels.to_vec()),
        };

        log::info!(
            "Fitting NCA: {} samples x {} dims -> {} components (seed {})",
            x.nrows(),
            d,
            n_components,
            self.config.random_seed
        );
        let started = Instant::now();

        let mut components = gaussian_init(n_components, d, &mut rng);
        let (mut objective, mut gradient) = objective_and_gradient(&components, x.view(), &y)?;
        let initial_objective = objective;

        let mut step = self.config.learning_rate;
        let mut iterations = 0;
        let mut stop = StopReason::MaxIterations;

        while iterations < self.config.max_iterations {
            if step < MIN_STEP {
                stop = StopReason::StepUnderflow;
                break;
            }
            iterations += 1;

            let candidate = &components + &(&gradient * step);
            let (candidate_objective, candidate_gradient) =
                objective_and_gradient(&candidate, x.view(), &y)?;

            if candidate_objective >= objective {
                let improvement = (candidate_objective - objective) / objective.max(f64::EPSILON);
                components = candidate;
                objective = candidate_objective;
                gradient = candidate_gradient;
                step *= STEP_GROWTH;

                log::debug!("NCA iter {iterations}: objective {objective:.6}, step {step:.3e}");

                if improvement < self.config.tolerance {
                    stop = StopReason::Converged;
                    break;
                }
            } else {
                step *= 0.5;
            }
        }
        let converged = stop == StopReason::Converged;

        log::info!(
            "NCA done in {:.2?}: objective {:.4} -> {:.4} after {} iterations ({:?})",
            started.elapsed(),
            initial_objective,
            objective,
            iterations,
            stop
        );

        Ok(NcaFit {
            projection: MetricProjection::new(components),
            objective,
            initial_objective,
            iterations,
            converged,
            stop,
            fit_samples: x.nrows(),
        })
    }

    /// Seeded subsample of row indices (sorted) when the bank exceeds
    /// `max_fit_samples`; `None` means use every row.
    ///
    /// Every class keeps at least one row, so a rare class cannot vanish
    /// from the fit. The remaining slots are filled uniformly.
    fn subsample_rows(&self, labels: &[usize], rng: &mut ChaCha8Rng) -> Option<Vec<usize>> {
        let n = labels.len();
        let cap = self.config.max_fit_samples;
        if cap == 0 || n <= cap {
            return None;
        }

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(row);
        }

        let mut taken = vec![false; n];
        let mut rows = Vec::with_capacity(cap.max(by_class.len()));
        for members in by_class.values() {
            let row = members[rng.gen_range(0..members.len())];
            taken[row] = true;
            rows.push(row);
        }

        // Partial Fisher-Yates over the rest: the first `fill` slots end up uniformly sampled
        let mut rest: Vec<usize> = (0..n).filter(|&row| !taken[row]).collect();
        let fill = cap.saturating_sub(rows.len()).min(rest.len());
        for i in 0..fill {
            let j = rng.gen_range(i..rest.len());
            rest.swap(i, j);
        }
        rows.extend_from_slice(&rest[..fill]);
        rows.sort_unstable();

        log::debug!(
            "NCA subsampled {} of {n} bank rows ({} classes kept)",
            rows.len(),
            by_class.len()
        );
        Some(rows)
    }
}

fn check_class_count(labels: &[usize]) -> Result<()> {
    let distinct: BTreeSet<usize> = labels.iter().copied().collect();
    if distinct.len() < 2 {
        return Err(LocalizerError::fitting(format!(
            "metric learning needs at least two classes, found {}",
            distinct.len()
        )));
    }
    Ok(())
}

/// Standard normal matrix scaled by `1/sqrt(d)` (Box-Muller).
fn gaussian_init(rows: usize, cols: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let scale = 1.0 / (cols as f64).sqrt();
    Array2::from_shape_simple_fn((rows, cols), || {
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * scale
    })
}

/// Normalized objective `f(A)/n` and its gradient `∂f/∂A / n`.
pub(crate) fn objective_and_gradient(
    components: &Array2<f64>,
    x: ArrayView2<'_, f64>,
    y: &[usize],
) -> Result<(f64, Array2<f64>)> {
    let n = x.nrows();
    let z = x.dot(&components.t());

    // Row i of W plus p_i, computed independently per row
    let rows: Vec<(f64, Vec<f64>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let zi = z.row(i);
            let mut dist = vec![0.0; n];
            let mut min_dist = f64::INFINITY;
            for (j, dj) in dist.iter_mut().enumerate() {
                if j == i {
                    continue;
                }
                let zj = z.row(j);
                *dj = zi.iter().zip(zj.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                min_dist = min_dist.min(*dj);
            }

            let mut p = vec![0.0; n];
            let mut norm = 0.0;
            for j in 0..n {
                if j != i {
                    p[j] = (-(dist[j] - min_dist)).exp();
                    norm += p[j];
                }
            }
            let mut p_same = 0.0;
            for j in 0..n {
                p[j] /= norm;
                if y[j] == y[i] {
                    p_same += p[j];
                }
            }

            let w = (0..n)
                .map(|j| {
                    let same = if y[j] == y[i] { 1.0 } else { 0.0 };
                    p[j] * (same - p_same)
                })
                .collect();
            (p_same, w)
        })
        .collect();

    let mut objective = 0.0;
    let mut w = Array2::<f64>::zeros((n, n));
    for (i, (p_same, row)) in rows.into_iter().enumerate() {
        objective += p_same;
        for (j, v) in row.into_iter().enumerate() {
            w[[i, j]] = v;
        }
    }

    if !objective.is_finite() {
        return Err(LocalizerError::fitting("NCA objective became non-finite"));
    }

    let col_sums = w.sum_axis(Axis(0));
    let mut w_sym = &w + &w.t();
    for (j, c) in col_sums.iter().enumerate() {
        w_sym[[j, j]] = -c;
    }

    let gradient = z.t().dot(&w_sym).dot(&x) * (2.0 / n as f64);
    Ok((objective / n as f64, gradient))
}
