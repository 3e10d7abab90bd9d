//! End-to-end localization pipeline.
//!
//! Connects every stage, in order:
//!
//! ```text
//! FeatureTable ─► MinMaxScaler ─► WindowBuilder ─► split ─┬─► TrainingBank ─► NcaLearner ─► projection
//!                                                         │                                    │
//!                                                         │        projected bank ─► KnnIndex ─┤
//!                                                         │                                    ▼
//!                                                         └─► TestQuery ─────────► ContextAssembler
//!                                                                                           │
//!                                                            InContextClassifier ◄─ InferenceLoop
//!                                                                                           │
//!                                                                        ClassificationMetrics / report
//! ```
//!
//! Each stage runs once and fails with an error naming that stage. Reports are
//! written only by [`Pipeline::write_report`] after [`Pipeline::run`] returned
//! successfully, so a failed run never leaves a partial report behind.
//!
//! # Example
//!
//! ```ignore
//! use context_localizer::prelude::*;
//!
//! let table = FeatureTable::load_npy("features.npy", "labels.npy", None)?;
//! let pipeline = PipelineBuilder::new()
//!     .retrieval_k(512)
//!     .temporal_ratio(0.5)
//!     .build()?;
//!
//! let mut classifier = KnnVoteClassifier::new(16);
//! let output = pipeline.run(&table, &mut classifier)?;
//! pipeline.write_report(&output)?;
//! ```

use crate::classifier::InContextClassifier;
use crate::config::{MetricConfig, PipelineConfig, RetrievalConfig, WindowConfig};
use crate::context::ContextAssembler;
use crate::error::Result;
use crate::evaluation::{ClassificationMetrics, EvaluationReport};
use crate::index::KnnIndex;
use crate::inference::{InferenceLoop, ProgressCallback, RunFingerprint};
use crate::metric::{MetricProjection, NcaLearner, StopReason};
use crate::preprocessing::MinMaxScaler;
use crate::source::FeatureTable;
use crate::windowing::WindowBuilder;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Wall time per stage.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    pub windowing: Duration,
    pub metric_fit: Duration,
    pub indexing: Duration,
    pub inference: Duration,
    pub evaluation: Duration,
}

/// Summary of the metric fit.
#[derive(Debug, Clone)]
pub struct MetricSummary {
    /// Mean same-label neighbor probability at the end of the fit
    pub objective: f64,

    /// Same, for the random initialization
    pub initial_objective: f64,

    pub iterations: usize,
    pub converged: bool,
    pub stop: StopReason,

    /// Bank rows used for fitting
    pub fit_samples: usize,
}

/// Output from a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// One prediction per test window, in temporal order
    pub predictions: Vec<usize>,

    /// Ground truth aligned with `predictions`
    pub truth: Vec<usize>,

    /// Scores
    pub metrics: ClassificationMetrics,

    /// Fitted projection
    pub projection: MetricProjection,

    /// Metric fit summary
    pub metric: MetricSummary,

    /// Training bank size
    pub bank_size: usize,

    /// Temporal anchor size
    pub anchor_size: usize,

    /// Mean context size over batches
    pub mean_context_size: f64,

    /// Batches restored from a result log
    pub resumed_batches: usize,

    /// Backend name
    pub classifier: String,

    pub timings: StageTimings,
}

/// The localization pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    progress: Option<Box<dyn ProgressCallback>>,
}

impl Pipeline {
    /// Create pipeline from configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            config,
            progress: None,
        })
    }

    /// Attach a progress callback for the inference loop.
    pub fn with_progress(mut self, progress: Box<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on `table` with `classifier`.
    pub fn run(
        &self,
        table: &FeatureTable,
        classifier: &mut dyn InContextClassifier,
    ) -> Result<PipelineOutput> {
        let cfg = &self.config;
        let mut timings = StageTimings::default();

        // Stage 1: scale and window
        let t = Instant::now();
        log::info!(
            "[1/5] Windowing {} rows x {} features (window {})",
            table.len(),
            table.n_features(),
            cfg.window.window_size
        );
        let scaled = MinMaxScaler::fit(table.features.view())?.transform(table.features.view())?;
        let windows = WindowBuilder::new(cfg.window.window_size).build(scaled.view(), &table.labels)?;
        let (bank, queries) = windows.split_chronological(cfg.window.train_fraction)?;
        log::info!("  bank {} windows, test {} windows", bank.len(), queries.len());
        timings.windowing = t.elapsed();

        // Stage 2: metric learning
        let t = Instant::now();
        log::info!("[2/5] Fitting metric ({} components)", cfg.metric.nca_components);
        let fit = NcaLearner::new(cfg.metric.clone()).fit(bank.features.view(), &bank.labels)?;
        timings.metric_fit = t.elapsed();

        // Stage 3: index + assembler
        let t = Instant::now();
        log::info!("[3/5] Indexing projected bank");
        let projected = fit.projection.transform(bank.features.view())?;
        let index = KnnIndex::build(projected, cfg.retrieval.k_semantic())?;
        let assembler = ContextAssembler::new(fit.projection.clone(), index, &cfg.retrieval)?;
        timings.indexing = t.elapsed();

        // Stage 4: inference
        let t = Instant::now();
        log::info!("[4/5] Inference with `{}`", classifier.name());
        let mut inference = InferenceLoop::new(&assembler, &bank, cfg.inference.clone(), table.n_classes())
            .with_seed(cfg.metric.random_seed);
        if cfg.inference.result_log.is_some() {
            inference = inference.with_fingerprint(run_fingerprint(cfg, table, &*classifier)?);
        }
        if let Some(progress) = self.progress.as_deref() {
            inference = inference.with_progress(Box::new(ProgressRef(progress)));
        }
        let inferred = inference.run(&queries, classifier)?;
        timings.inference = t.elapsed();

        // Stage 5: evaluation
        let t = Instant::now();
        log::info!("[5/5] Evaluating {} predictions", inferred.predictions.len());
        let metrics = ClassificationMetrics::compute(
            &queries.labels,
            &inferred.predictions,
            table.encoder.class_names(),
        )?;
        timings.evaluation = t.elapsed();

        log::info!(
            "Accuracy {:.4}, F1 (weighted) {:.4}, MCC {:.4}",
            metrics.accuracy,
            metrics.f1_weighted,
            metrics.mcc
        );

        Ok(PipelineOutput {
            mean_context_size: inferred.mean_context_size(),
            predictions: inferred.predictions,
            truth: queries.labels,
            metrics,
            projection: fit.projection,
            metric: MetricSummary {
                objective: fit.objective,
                initial_objective: fit.initial_objective,
                iterations: fit.iterations,
                converged: fit.converged,
                stop: fit.stop,
                fit_samples: fit.fit_samples,
            },
            bank_size: bank.len(),
            anchor_size: assembler.anchor().len(),
            resumed_batches: inferred.resumed_batches,
            classifier: classifier.name().to_string(),
            timings,
        })
    }

    /// Build the report for a completed run.
    pub fn report(&self, output: &PipelineOutput) -> EvaluationReport {
        let cfg = &self.config;
        let mut report = EvaluationReport::new(cfg.report.title.clone(), output.metrics.clone())
            .with_setting("classifier", &output.classifier)
            .with_setting("window_size", cfg.window.window_size)
            .with_setting("retrieval_k", cfg.retrieval.retrieval_k)
            .with_setting("temporal_ratio", cfg.retrieval.temporal_ratio)
            .with_setting("granularity", format!("{:?}", cfg.retrieval.granularity))
            .with_setting("nca_components", cfg.metric.nca_components)
            .with_setting("batch_size", cfg.inference.batch_size)
            .with_setting("random_seed", cfg.metric.random_seed)
            .with_setting("bank_size", output.bank_size)
            .with_setting("anchor_size", output.anchor_size)
            .with_setting("mean_context_size", format!("{:.1}", output.mean_context_size))
            .with_setting(
                "nca_objective",
                format!("{:.4} -> {:.4}", output.metric.initial_objective, output.metric.objective),
            )
            .with_setting(
                "nca_stop",
                format!("{:?} after {} iterations", output.metric.stop, output.metric.iterations),
            );
        if let Some(meta) = &cfg.metadata {
            report = report.with_setting("experiment", &meta.name);
        }
        report
    }

    /// Write the configured report artifacts for a completed run.
    pub fn write_report(&self, output: &PipelineOutput) -> Result<EvaluationReport> {
        let cfg = &self.config.report;
        let report = self.report(output);

        report.write_text(&cfg.output_path)?;
        log::info!("Report written to {}", cfg.output_path.display());
        if let Some(path) = &cfg.json_path {
            report.write_json(path)?;
            log::info!("JSON report written to {}", path.display());
        }
        if let Some(path) = &cfg.projection_path {
            output.projection.save_npy(path)?;
            log::info!("Projection written to {}", path.display());
        }
        Ok(report)
    }
}

/// Settings that feed the predictions. Report, metadata, data paths and the
/// release cadence are left out.
#[derive(Serialize)]
struct PredictionSettings<'a> {
    window: &'a WindowConfig,
    retrieval: &'a RetrievalConfig,
    metric: &'a MetricConfig,
    batch_size: usize,
}

/// Identity of a run for its result log: input table, settings, classifier.
fn run_fingerprint(
    config: &PipelineConfig,
    table: &FeatureTable,
    classifier: &dyn InContextClassifier,
) -> Result<String> {
    let settings = PredictionSettings {
        window: &config.window,
        retrieval: &config.retrieval,
        metric: &config.metric,
        batch_size: config.inference.batch_size,
    };
    Ok(RunFingerprint::new()
        .with_json(&settings)?
        .with_matrix(table.features.view())
        .with_labels(&table.labels)
        .with_json(&table.encoder.class_names())?
        .with_str(&classifier.describe())
        .finish())
}

/// Forwards to a callback owned by the pipeline.
struct ProgressRef<'a>(&'a dyn ProgressCallback);

impl ProgressCallback for ProgressRef<'_> {
    fn on_batch(&self, info: &crate::inference::ProgressInfo) {
        self.0.on_batch(info);
    }

    fn on_complete(&self, output: &crate::inference::InferenceOutput) {
        self.0.on_complete(output);
    }
}
