//! End-to-end pipeline tests on a synthetic indoor walk.

use context_localizer::prelude::*;
use context_localizer::config::DataConfig;
use ndarray::{Array1, Array2, ArrayView2};
use ndarray_npy::WriteNpyExt;
use std::fs::File;
use tempfile::TempDir;

/// A walker moves through four rooms, staying ~20 readings in each.
/// Each room has a distinct RSSI-like signature over four access points.
fn walk(rows: usize) -> (Array2<f64>, Vec<i64>) {
    let room_of = |r: usize| (r / 20) % 4;
    let labels: Vec<i64> = (0..rows).map(|r| 100 + room_of(r) as i64).collect();
    let features = Array2::from_shape_fn((rows, 4), |(r, ap)| {
        let room = room_of(r);
        let signal = if room == ap { -40.0 } else { -80.0 + (room * 3 + ap) as f64 };
        signal + ((r * 13 + ap * 7) % 9) as f64 * 0.3
    });
    (features, labels)
}

fn table(rows: usize) -> FeatureTable {
    let (features, labels) = walk(rows);
    FeatureTable::new(features, &labels).unwrap()
}

fn builder() -> PipelineBuilder {
    PipelineBuilder::new()
        .window_size(4)
        .retrieval_k(32)
        .nca_components(4)
        .max_iterations(15)
        .batch_size(10)
        .seed(7)
}

// ============================================================================
// Basic runs
// ============================================================================

#[test]
fn test_run_predicts_every_test_window() {
    let table = table(400);
    let pipeline = builder().build().unwrap();
    let output = pipeline.run(&table, &mut KnnVoteClassifier::new(5)).unwrap();

    // 396 windows -> 316 bank, 80 test
    assert_eq!(output.bank_size, 316);
    assert_eq!(output.predictions.len(), 80);
    assert_eq!(output.anchor_size, 16);
    assert!(output.mean_context_size <= 32.0);
    assert_eq!(output.metrics.per_class.len(), 4);
    assert_eq!(output.metrics.n_samples, 80);
    assert!(output.metrics.accuracy > 0.4);
}

#[test]
fn test_same_seed_same_predictions() {
    let table = table(300);
    let pipeline = builder().granularity(RetrievalGranularity::PerSample).build().unwrap();

    let a = pipeline.run(&table, &mut KnnVoteClassifier::new(3)).unwrap();
    let b = pipeline.run(&table, &mut KnnVoteClassifier::new(3)).unwrap();
    assert_eq!(a.predictions, b.predictions);
    assert_eq!(a.projection, b.projection);
}

/// Records the context handed over on every call.
struct Spy {
    inner: KnnVoteClassifier,
    contexts: Vec<Vec<usize>>,
}

impl InContextClassifier for Spy {
    fn name(&self) -> &str {
        "spy"
    }

    fn predict(&mut self, context: &ContextSnapshot, queries: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        self.contexts.push(context.indices().to_vec());
        self.inner.predict(context, queries)
    }
}

#[test]
fn test_temporal_only_context_is_bank_tail() {
    let table = table(300);
    let pipeline = builder().temporal_ratio(1.0).build().unwrap();
    let mut spy = Spy {
        inner: KnnVoteClassifier::new(3),
        contexts: Vec::new(),
    };

    let output = pipeline.run(&table, &mut spy).unwrap();
    let expected: Vec<usize> = (output.bank_size - 32..output.bank_size).collect();
    assert!(!spy.contexts.is_empty());
    assert!(spy.contexts.iter().all(|c| *c == expected));
}

#[test]
fn test_small_bank_uses_whole_bank() {
    // 40 rows, window 4 -> 36 windows -> 28 bank entries, below the budget of 32
    let table = table(40);
    let pipeline = builder().batch_size(4).build().unwrap();
    let mut spy = Spy {
        inner: KnnVoteClassifier::new(3),
        contexts: Vec::new(),
    };

    let output = pipeline.run(&table, &mut spy).unwrap();
    assert_eq!(output.bank_size, 28);
    let whole: Vec<usize> = (0..28).collect();
    assert!(spy.contexts.iter().all(|c| *c == whole));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_single_class_bank_fails_before_inference() {
    let features = Array2::from_shape_fn((60, 2), |(r, c)| (r + c) as f64);
    let table = FeatureTable::new(features, &[5; 60]).unwrap();

    let dir = TempDir::new().unwrap();
    let report_path = dir.path().join("results.txt");
    let pipeline = builder().report_path(&report_path).build().unwrap();

    let err = pipeline.run(&table, &mut KnnVoteClassifier::new(3)).unwrap_err();
    assert!(matches!(err, LocalizerError::Fitting(_)));
    assert!(!report_path.exists());
}

#[test]
fn test_wrong_prediction_count_aborts() {
    struct Short;
    impl InContextClassifier for Short {
        fn name(&self) -> &str {
            "short"
        }
        fn predict(&mut self, _: &ContextSnapshot, queries: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
            Ok(vec![0; queries.nrows().saturating_sub(1)])
        }
    }

    let table = table(200);
    let pipeline = builder().build().unwrap();
    let err = pipeline.run(&table, &mut Short).unwrap_err();
    assert!(matches!(err, LocalizerError::Inference { batch: 0, .. }));
    assert_eq!(err.stage(), "inference");
}

// ============================================================================
// Resume
// ============================================================================

/// Fails on the n-th call, otherwise delegates (and describes itself as the
/// wrapped classifier, so a later plain run may resume its log).
struct Flaky {
    inner: KnnVoteClassifier,
    calls: usize,
    fail_at: usize,
}

impl InContextClassifier for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn predict(&mut self, context: &ContextSnapshot, queries: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let call = self.calls;
        self.calls += 1;
        if call == self.fail_at {
            return Err(LocalizerError::ServiceUnavailable("out of device memory".to_string()));
        }
        self.inner.predict(context, queries)
    }
}

#[test]
fn test_resume_matches_uninterrupted_run() {
    let dir = TempDir::new().unwrap();
    let table = table(400);

    let uninterrupted = builder()
        .build()
        .unwrap()
        .run(&table, &mut KnnVoteClassifier::new(5))
        .unwrap();

    let pipeline = builder().result_log(dir.path().join("run.jsonl")).build().unwrap();
    let mut flaky = Flaky {
        inner: KnnVoteClassifier::new(5),
        calls: 0,
        fail_at: 3,
    };
    let err = pipeline.run(&table, &mut flaky).unwrap_err();
    assert!(matches!(err, LocalizerError::Inference { batch: 3, .. }));

    let resumed = pipeline.run(&table, &mut KnnVoteClassifier::new(5)).unwrap();
    assert_eq!(resumed.resumed_batches, 3);
    assert_eq!(resumed.predictions, uninterrupted.predictions);
}

#[test]
fn test_resume_rejects_different_seed() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("run.jsonl");
    let table = table(300);

    builder()
        .result_log(&log)
        .build()
        .unwrap()
        .run(&table, &mut KnnVoteClassifier::new(3))
        .unwrap();

    let err = builder()
        .result_log(&log)
        .seed(8)
        .build()
        .unwrap()
        .run(&table, &mut KnnVoteClassifier::new(3))
        .unwrap_err();
    assert!(matches!(err, LocalizerError::Configuration(_)));
}

fn interrupted_log(dir: &TempDir, table: &FeatureTable, builder: PipelineBuilder) -> std::path::PathBuf {
    let log = dir.path().join("run.jsonl");
    let mut flaky = Flaky {
        inner: KnnVoteClassifier::new(5),
        calls: 0,
        fail_at: 3,
    };
    let err = builder.result_log(&log).build().unwrap().run(table, &mut flaky).unwrap_err();
    assert!(matches!(err, LocalizerError::Inference { batch: 3, .. }));
    log
}

#[test]
fn test_resume_rejects_changed_temporal_ratio() {
    let dir = TempDir::new().unwrap();
    let table = table(400);
    let log = interrupted_log(&dir, &table, builder().temporal_ratio(0.0));

    let err = builder()
        .temporal_ratio(1.0)
        .result_log(&log)
        .build()
        .unwrap()
        .run(&table, &mut KnnVoteClassifier::new(5))
        .unwrap_err();
    assert!(matches!(err, LocalizerError::Configuration(_)));

    // The original settings still resume
    let resumed = builder()
        .temporal_ratio(0.0)
        .result_log(&log)
        .build()
        .unwrap()
        .run(&table, &mut KnnVoteClassifier::new(5))
        .unwrap();
    assert_eq!(resumed.resumed_batches, 3);
}

#[test]
fn test_resume_rejects_other_classifier_settings() {
    let dir = TempDir::new().unwrap();
    let table = table(400);
    let log = interrupted_log(&dir, &table, builder());

    let err = builder()
        .result_log(&log)
        .build()
        .unwrap()
        .run(&table, &mut KnnVoteClassifier::new(1))
        .unwrap_err();
    assert!(matches!(err, LocalizerError::Configuration(_)));
}

#[test]
fn test_resume_rejects_other_data_of_same_length() {
    let dir = TempDir::new().unwrap();
    let table = table(400);
    let log = interrupted_log(&dir, &table, builder());

    let (mut features, labels) = walk(400);
    features[[0, 0]] += 1.0;
    let other = FeatureTable::new(features, &labels).unwrap();

    let err = builder()
        .result_log(&log)
        .build()
        .unwrap()
        .run(&other, &mut KnnVoteClassifier::new(5))
        .unwrap_err();
    assert!(matches!(err, LocalizerError::Configuration(_)));
}

// ============================================================================
// Files in, reports out
// ============================================================================

#[test]
fn test_npy_to_report() {
    let dir = TempDir::new().unwrap();
    let (features, labels) = walk(300);

    let features_path = dir.path().join("features.npy");
    let labels_path = dir.path().join("labels.npy");
    let names_path = dir.path().join("classes.json");
    features.write_npy(File::create(&features_path).unwrap()).unwrap();
    Array1::from(labels)
        .write_npy(File::create(&labels_path).unwrap())
        .unwrap();
    std::fs::write(&names_path, r#"["kitchen","hall","office","lab"]"#).unwrap();

    let mut config = builder()
        .report_path(dir.path().join("results.txt"))
        .json_report(dir.path().join("results.json"))
        .experiment("npy_roundtrip", "files in, report out")
        .build_config()
        .unwrap()
        .with_data(DataConfig {
            features_path: features_path.clone(),
            labels_path: labels_path.clone(),
            class_names_path: Some(names_path.clone()),
        });
    config.report.projection_path = Some(dir.path().join("projection.npy"));

    let config_path = dir.path().join("run.toml");
    config.save_toml(&config_path).unwrap();
    let config = PipelineConfig::load_toml(&config_path).unwrap();

    let data = config.data.clone().unwrap();
    let table = FeatureTable::load_npy(
        &data.features_path,
        &data.labels_path,
        data.class_names_path.as_ref(),
    )
    .unwrap();
    assert_eq!(table.n_classes(), 4);

    let mut classifier = context_localizer::classifier::from_config(&config.classifier).unwrap();
    let pipeline = Pipeline::from_config(config).unwrap();
    let output = pipeline.run(&table, classifier.as_mut()).unwrap();
    pipeline.write_report(&output).unwrap();

    let text = std::fs::read_to_string(dir.path().join("results.txt")).unwrap();
    assert!(text.contains("kitchen"));
    assert!(text.contains("npy_roundtrip"));
    assert!(text.contains("Balanced accuracy:"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("results.json")).unwrap())
            .unwrap();
    assert_eq!(json["metrics"]["per_class"].as_array().unwrap().len(), 4);
    assert!(dir.path().join("projection.npy").exists());
}
