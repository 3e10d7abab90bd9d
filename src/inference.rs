//! Sequential batch inference over the test windows.
//!
//! Each batch runs four steps in order: assemble its context, gather a
//! [`ContextSnapshot`], classify the unprojected batch, and validate and
//! record the predictions. Any failure aborts the loop with an
//! [`LocalizerError::Inference`] tagged with the batch index.
//!
//! # Resuming
//!
//! With a [`ResultLog`] configured, every completed batch is appended to a
//! JSON-lines file and flushed before the next batch starts. A later run with
//! the same shape (test size, batch size, seed) and the same [`RunFingerprint`]
//! skips the batches already in the log and continues from the first missing
//! one. The fingerprint covers the input data, every setting that feeds the
//! predictions and the classifier description, so a log is never reused
//! under different settings.
//!
//! ```text
//! {"kind":"header","n_test":3120,"batch_size":50,"seed":42,"fingerprint":"9f2c..."}
//! {"kind":"batch","batch":0,"context_size":2048,"predictions":[3,3,4,...]}
//! {"kind":"batch","batch":1,"context_size":2048,"predictions":[4,4,4,...]}
//! ```

use crate::classifier::{ContextSnapshot, InContextClassifier};
use crate::config::InferenceConfig;
use crate::context::ContextAssembler;
use crate::error::{LocalizerError, Result};
use crate::windowing::{TestQuery, TrainingBank};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ============================================================================
// Result Log
// ============================================================================

/// SHA-256 digest over everything a run's predictions depend on.
///
/// Each piece is length-prefixed, so different splits of the same bytes
/// never collide.
#[derive(Clone, Default)]
pub struct RunFingerprint {
    hasher: Sha256,
}

impl RunFingerprint {
    /// Empty fingerprint.
    pub fn new() -> Self {
        Self::default()
    }

    fn piece(mut self, bytes: &[u8]) -> Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Add a serializable value (settings) by its JSON form.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self> {
        Ok(self.piece(&serde_json::to_vec(value)?))
    }

    /// Add free text.
    pub fn with_str(self, text: &str) -> Self {
        self.piece(text.as_bytes())
    }

    /// Add a matrix: shape, then values in logical row-major order.
    pub fn with_matrix(self, matrix: ArrayView2<'_, f64>) -> Self {
        let mut bytes = Vec::with_capacity(16 + matrix.len() * 8);
        bytes.extend_from_slice(&(matrix.nrows() as u64).to_le_bytes());
        bytes.extend_from_slice(&(matrix.ncols() as u64).to_le_bytes());
        for value in matrix.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        self.piece(&bytes)
    }

    /// Add encoded labels.
    pub fn with_labels(self, labels: &[usize]) -> Self {
        let bytes: Vec<u8> = labels.iter().flat_map(|&l| (l as u64).to_le_bytes()).collect();
        self.piece(&bytes)
    }

    /// Hex digest.
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// Shape of a run; a log can only be resumed by a run of the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunShape {
    /// Number of test windows
    pub n_test: usize,

    /// Windows per batch
    pub batch_size: usize,

    /// Random seed of the metric fit
    pub seed: u64,

    /// [`RunFingerprint`] digest of data, settings and classifier
    pub fingerprint: String,
}

/// One completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Batch index
    pub batch: usize,

    /// Size of the context the batch was conditioned on
    pub context_size: usize,

    /// Predicted labels, in query order
    pub predictions: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LogLine {
    Header(RunShape),
    Batch(BatchRecord),
}

/// Append-only log of completed batches.
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ResultLog {
    /// Open `path` for a run of `shape`.
    ///
    /// Returns the log positioned for appending and the contiguous prefix of
    /// batches already recorded. A trailing partial line (interrupted write)
    /// and any record after a gap are discarded. A header for a different
    /// shape is a configuration error.
    pub fn open<P: AsRef<Path>>(path: P, shape: RunShape) -> Result<(Self, Vec<BatchRecord>)> {
        let path = path.as_ref().to_path_buf();
        let completed = if path.exists() {
            Self::read_completed(&path, &shape)?
        } else {
            Vec::new()
        };

        // Rewrite so the file holds exactly the accepted prefix
        let mut writer = BufWriter::new(File::create(&path)?);
        write_line(&mut writer, &LogLine::Header(shape))?;
        for record in &completed {
            write_line(&mut writer, &LogLine::Batch(record.clone()))?;
        }
        writer.flush()?;

        let writer = BufWriter::new(OpenOptions::new().append(true).open(&path)?);
        if !completed.is_empty() {
            log::info!(
                "Resuming from {}: {} batches already complete",
                path.display(),
                completed.len()
            );
        }
        Ok((Self { path, writer }, completed))
    }

    fn read_completed(path: &Path, shape: &RunShape) -> Result<Vec<BatchRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => return Ok(Vec::new()),
        };
        if header.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<LogLine>(&header) {
            Ok(LogLine::Header(found)) if found == *shape => {}
            Ok(LogLine::Header(found)) if found.fingerprint != shape.fingerprint => {
                return Err(LocalizerError::config(format!(
                    "result log {} was written for different data, settings or classifier \
                     (fingerprint {} vs {}); remove it or choose another result_log path",
                    path.display(),
                    found.fingerprint,
                    shape.fingerprint
                )))
            }
            Ok(LogLine::Header(found)) => {
                return Err(LocalizerError::config(format!(
                    "result log {} was written for {found:?}, current run is {shape:?}",
                    path.display()
                )))
            }
            _ => {
                return Err(LocalizerError::config(format!(
                    "result log {} has no valid header",
                    path.display()
                )))
            }
        }

        let mut completed = Vec::new();
        for line in lines {
            let line = line?;
            match serde_json::from_str::<LogLine>(&line) {
                Ok(LogLine::Batch(record)) if record.batch == completed.len() => {
                    completed.push(record)
                }
                Ok(_) => {
                    log::warn!("Result log gap after batch {}; ignoring the rest", completed.len());
                    break;
                }
                Err(e) => {
                    log::warn!("Discarding unreadable result log line: {e}");
                    break;
                }
            }
        }
        Ok(completed)
    }

    /// Append a batch and flush it to disk.
    pub fn append(&mut self, record: &BatchRecord) -> Result<()> {
        write_line(&mut self.writer, &LogLine::Batch(record.clone()))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_line<W: Write>(writer: &mut W, line: &LogLine) -> Result<()> {
    serde_json::to_writer(&mut *writer, line)?;
    writer.write_all(b"\n")?;
    Ok(())
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Progress information for callbacks.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Batch just completed (0-based).
    pub batch: usize,

    /// Total number of batches.
    pub total_batches: usize,

    /// Context size of the batch.
    pub context_size: usize,

    /// Elapsed time since the loop started (excludes resumed batches).
    pub elapsed: Duration,

    /// Batches run in this session.
    pub run_this_session: usize,
}

impl ProgressInfo {
    /// Get completion percentage (0.0 to 100.0).
    pub fn percent_complete(&self) -> f64 {
        if self.total_batches == 0 {
            100.0
        } else {
            (self.batch + 1) as f64 / self.total_batches as f64 * 100.0
        }
    }

    /// Estimate remaining time from this session's pace.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.run_this_session == 0 {
            return None;
        }
        let remaining = self.total_batches.saturating_sub(self.batch + 1);
        let avg = self.elapsed.as_secs_f64() / self.run_this_session as f64;
        Some(Duration::from_secs_f64(avg * remaining as f64))
    }
}

/// Receives progress updates from the inference loop.
pub trait ProgressCallback {
    /// Called after each batch completes.
    fn on_batch(&self, info: &ProgressInfo);

    /// Called once when the loop finishes.
    fn on_complete(&self, output: &InferenceOutput);
}

/// Progress reporter writing to the `log` facade.
#[derive(Debug, Clone)]
pub struct LogProgress {
    /// Report every N batches at info level (others at debug).
    pub every: usize,
}

impl LogProgress {
    /// Report every `every` batches.
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1) }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ProgressCallback for LogProgress {
    fn on_batch(&self, info: &ProgressInfo) {
        if (info.batch + 1) % self.every == 0 || info.batch + 1 == info.total_batches {
            log::info!(
                "[{:4}/{:4}] {:.1}% complete, context {}, eta {:.0?}",
                info.batch + 1,
                info.total_batches,
                info.percent_complete(),
                info.context_size,
                info.estimated_remaining().unwrap_or_default()
            );
        }
    }

    fn on_complete(&self, output: &InferenceOutput) {
        log::info!(
            "Inference complete: {} predictions over {} batches ({} resumed) in {:.2?}",
            output.predictions.len(),
            output.batches,
            output.resumed_batches,
            output.elapsed
        );
    }
}

// ============================================================================
// Inference Loop
// ============================================================================

/// Result of a full pass over the test windows.
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    /// One prediction per test window, in temporal order
    pub predictions: Vec<usize>,

    /// Context size per batch
    pub context_sizes: Vec<usize>,

    /// Number of batches
    pub batches: usize,

    /// Batches restored from the result log
    pub resumed_batches: usize,

    /// Wall time of this session
    pub elapsed: Duration,
}

impl InferenceOutput {
    /// Mean context size over all batches.
    pub fn mean_context_size(&self) -> f64 {
        if self.context_sizes.is_empty() {
            return 0.0;
        }
        self.context_sizes.iter().sum::<usize>() as f64 / self.context_sizes.len() as f64
    }
}

/// Drives context assembly and classification batch by batch.
///
/// Borrows the assembler and bank immutably for the whole loop.
pub struct InferenceLoop<'a> {
    assembler: &'a ContextAssembler,
    bank: &'a TrainingBank,
    config: InferenceConfig,
    n_classes: usize,
    seed: u64,
    fingerprint: String,
    progress: Option<Box<dyn ProgressCallback + 'a>>,
}

impl<'a> InferenceLoop<'a> {
    /// Create a loop predicting labels in `0..n_classes`.
    pub fn new(
        assembler: &'a ContextAssembler,
        bank: &'a TrainingBank,
        config: InferenceConfig,
        n_classes: usize,
    ) -> Self {
        Self {
            assembler,
            bank,
            config,
            n_classes,
            seed: 0,
            fingerprint: String::new(),
            progress: None,
        }
    }

    /// Seed recorded in the result log header.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fingerprint recorded in the result log header; see [`RunFingerprint`].
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, progress: Box<dyn ProgressCallback + 'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every batch of `queries` through `classifier`.
    pub fn run(
        &self,
        queries: &TestQuery,
        classifier: &mut dyn InContextClassifier,
    ) -> Result<InferenceOutput> {
        self.config.validate().map_err(LocalizerError::Configuration)?;
        if queries.is_empty() {
            return Err(LocalizerError::config("no test windows to classify"));
        }
        if queries.features.ncols() != self.bank.dim() {
            return Err(LocalizerError::config(format!(
                "test windows have {} features, training bank has {}",
                queries.features.ncols(),
                self.bank.dim()
            )));
        }

        let batch_size = self.config.batch_size;
        let total_batches = queries.batch_count(batch_size);
        let started = Instant::now();

        let mut predictions = Vec::with_capacity(queries.len());
        let mut context_sizes = Vec::with_capacity(total_batches);

        let mut log_file = match &self.config.result_log {
            Some(path) => {
                let shape = RunShape {
                    n_test: queries.len(),
                    batch_size,
                    seed: self.seed,
                    fingerprint: self.fingerprint.clone(),
                };
                let (log_file, completed) = ResultLog::open(path, shape)?;
                for record in completed.into_iter().take(total_batches) {
                    let (start, end) = queries.batch_bounds(record.batch, batch_size);
                    self.check_predictions(record.batch, end - start, &record.predictions)?;
                    predictions.extend_from_slice(&record.predictions);
                    context_sizes.push(record.context_size);
                }
                Some(log_file)
            }
            None => None,
        };
        let resumed_batches = context_sizes.len();

        log::info!(
            "Inference: {} test windows in {} batches of {} with `{}`",
            queries.len(),
            total_batches,
            batch_size,
            classifier.name()
        );

        for b in resumed_batches..total_batches {
            let batch = queries.batch(b, batch_size);

            let context = self
                .assembler
                .assemble(batch)
                .map_err(|e| LocalizerError::inference(b, format!("context assembly: {e}")))?;
            let snapshot = ContextSnapshot::from_bank(self.bank, &context)
                .map_err(|e| LocalizerError::inference(b, format!("context snapshot: {e}")))?;

            let batch_predictions = classifier.predict(&snapshot, batch).map_err(|e| {
                LocalizerError::inference(b, format!("classifier `{}`: {e}", classifier.name()))
            })?;
            self.check_predictions(b, batch.nrows(), &batch_predictions)?;

            log::debug!(
                "Batch {b}: {} queries, context {} (anchor {})",
                batch.nrows(),
                context.len(),
                self.assembler.anchor().len()
            );

            if let Some(log_file) = log_file.as_mut() {
                log_file.append(&BatchRecord {
                    batch: b,
                    context_size: context.len(),
                    predictions: batch_predictions.clone(),
                })?;
            }
            predictions.extend(batch_predictions);
            context_sizes.push(context.len());

            if let Some(progress) = &self.progress {
                progress.on_batch(&ProgressInfo {
                    batch: b,
                    total_batches,
                    context_size: context.len(),
                    elapsed: started.elapsed(),
                    run_this_session: b + 1 - resumed_batches,
                });
            }

            if (b + 1) % self.config.release_every == 0 {
                if let Err(e) = classifier.release_memory() {
                    log::warn!("Batch {b}: classifier memory release failed: {e}");
                }
            }
        }

        let output = InferenceOutput {
            predictions,
            context_sizes,
            batches: total_batches,
            resumed_batches,
            elapsed: started.elapsed(),
        };
        if let Some(progress) = &self.progress {
            progress.on_complete(&output);
        }
        Ok(output)
    }

    fn check_predictions(&self, batch: usize, expected: usize, predictions: &[usize]) -> Result<()> {
        if predictions.len() != expected {
            return Err(LocalizerError::inference(
                batch,
                format!(
                    "expected {expected} predictions, classifier returned {}",
                    predictions.len()
                ),
            ));
        }
        if let Some(&bad) = predictions.iter().find(|&&p| p >= self.n_classes) {
            return Err(LocalizerError::inference(
                batch,
                format!("predicted class {bad} outside 0..{}", self.n_classes),
            ));
        }
        Ok(())
    }
}
