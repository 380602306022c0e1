//! Online training driver
//!
//! Every batch goes through the same steps, in order:
//! 1. pull the next batch from the source
//! 2. hash it into sparse features
//! 3. predict class probabilities with the current model
//! 4. hand (labels, probabilities) to the windowed evaluator
//! 5. apply one incremental update with the same batch
//!
//! Predictions are always made before the model sees the batch, so the loss
//! series is a progressive (test-then-train) estimate.

use super::config::StreamConfig;
use super::evaluator::{LossPoint, WindowedEvaluator};
use super::reporter::LossReporter;
use super::warmup::warm_up;
use crate::error::{KolosalError, Result};
use crate::feature_engineering::FeatureHasher;
use crate::training::{ClassificationMetrics, Estimator, IncrementalClassifier};
use crate::utils::{BatchSource, CsvChunkSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Mutable state of one online run
#[derive(Debug)]
pub struct RunState<E> {
    pub estimator: E,
    pub evaluator: WindowedEvaluator,
    pub batches_processed: u64,
    pub rows_processed: u64,
    pub updates_applied: u64,
}

impl<E: IncrementalClassifier> RunState<E> {
    pub fn new(estimator: E, window_size: usize) -> Result<Self> {
        let evaluator = WindowedEvaluator::new(window_size, estimator.classes())?;
        Ok(Self {
            estimator,
            evaluator,
            batches_processed: 0,
            rows_processed: 0,
            updates_applied: 0,
        })
    }
}

/// Why the driver stopped pulling batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source had no more rows
    Exhausted,
    /// The configured number of batches was processed
    CapReached,
}

/// Outcome of an online run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub loss_series: Vec<LossPoint>,
    pub batches_processed: u64,
    pub rows_processed: u64,
    pub updates_applied: u64,
    pub stop_reason: StopReason,
    pub elapsed_secs: f64,
    /// Rows per second over the whole run
    pub throughput: f64,
}

/// Drives the pull, encode, predict, evaluate, update loop
#[derive(Debug, Clone)]
pub struct Driver {
    hasher: FeatureHasher,
    cap: Option<u64>,
}

impl Driver {
    /// `cap` is the number of batches after which the run stops; `None` runs to exhaustion
    pub fn new(hasher: FeatureHasher, cap: Option<u64>) -> Result<Self> {
        if cap == Some(0) {
            return Err(KolosalError::InvalidParameter {
                name: "max_batches".to_string(),
                value: "0".to_string(),
                reason: "a capped run processes at least one batch".to_string(),
            });
        }
        Ok(Self { hasher, cap })
    }

    pub fn hasher(&self) -> &FeatureHasher {
        &self.hasher
    }

    pub fn cap(&self) -> Option<u64> {
        self.cap
    }

    /// Run until the source is exhausted or the cap is reached.
    ///
    /// Any error from the source, the hasher, the model or the evaluator
    /// aborts the run; `state` keeps whatever was applied before the failure.
    pub fn run<S, E>(&self, source: &mut S, state: &mut RunState<E>, reporter: &mut dyn LossReporter) -> Result<RunSummary>
    where
        S: BatchSource + ?Sized,
        E: IncrementalClassifier,
    {
        let start = Instant::now();
        let stop_reason = loop {
            let batch = match source.next_batch()? {
                Some(batch) => batch,
                None => break StopReason::Exhausted,
            };

            let batch_index = state.batches_processed;
            let encoded = self.hasher.encode(&batch)?;
            let proba = state.estimator.predict_proba(&encoded.features)?;
            if let Some(point) = state.evaluator.record(batch_index, &encoded.labels, &proba)? {
                reporter.report(&point);
            }
            state.estimator.partial_fit(&encoded.features, &encoded.labels)?;

            state.batches_processed += 1;
            state.rows_processed += encoded.len() as u64;
            state.updates_applied += 1;
            debug!(batch_index, rows = encoded.len(), "batch applied");

            if self.cap.is_some_and(|cap| state.batches_processed >= cap) {
                break StopReason::CapReached;
            }
        };

        let elapsed_secs = start.elapsed().as_secs_f64();
        let throughput = if elapsed_secs > 0.0 { state.rows_processed as f64 / elapsed_secs } else { 0.0 };
        info!(
            batches = state.batches_processed,
            rows = state.rows_processed,
            windows = state.evaluator.series().len(),
            ?stop_reason,
            elapsed_secs,
            "online run finished"
        );

        Ok(RunSummary {
            loss_series: state.evaluator.series().points().to_vec(),
            batches_processed: state.batches_processed,
            rows_processed: state.rows_processed,
            updates_applied: state.updates_applied,
            stop_reason,
            elapsed_secs,
            throughput,
        })
    }
}

/// Warm-up metrics (when a warm-up ran) and the online run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub warmup: Option<ClassificationMetrics>,
    pub summary: RunSummary,
}

/// Open `path`, optionally warm up on its prefix, then train online over the whole file
pub fn run_from_config(path: impl AsRef<Path>, config: &StreamConfig, reporter: &mut dyn LossReporter) -> Result<RunReport> {
    config.validate()?;
    let path = path.as_ref();
    let hasher = config.hasher()?;
    let mut source = CsvChunkSource::open(path, &config.source_options())?;
    let mut estimator: Estimator = config.estimator.build(&config.classes, config.n_features)?;

    info!(
        path = %path.display(),
        chunk_size = config.chunk_size,
        window_size = config.window_size,
        n_features = config.n_features,
        cap = ?config.batch_cap(),
        "starting online run"
    );

    let warmup = match &config.warmup {
        Some(warmup_config) => {
            let metrics = warm_up(&mut source, &hasher, &mut estimator, warmup_config)?;
            source.restart()?;
            Some(metrics)
        }
        None => None,
    };

    let driver = Driver::new(hasher, config.batch_cap())?;
    let mut state = RunState::new(estimator, config.window_size)?;
    let summary = driver.run(&mut source, &mut state, reporter)?;
    Ok(RunReport { warmup, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::reporter::CollectingReporter;
    use crate::training::EstimatorKind;
    use crate::utils::CsvSourceOptions;
    use std::io::Cursor;

    fn source(rows: usize, chunk_size: usize) -> CsvChunkSource<Cursor<String>> {
        let mut data = String::from("id,click,site\n");
        for i in 0..rows {
            data.push_str(&format!("{},{},s{}\n", i, i % 2, i % 5));
        }
        let options = CsvSourceOptions { chunk_size, ..CsvSourceOptions::default() };
        CsvChunkSource::from_reader(Cursor::new(data), &options).unwrap()
    }

    fn state(window_size: usize) -> RunState<Estimator> {
        let classes = vec!["0".to_string(), "1".to_string()];
        let estimator = EstimatorKind::default().build(&classes, 32).unwrap();
        RunState::new(estimator, window_size).unwrap()
    }

    #[test]
    fn test_runs_to_exhaustion() {
        let driver = Driver::new(FeatureHasher::new(32).unwrap(), None).unwrap();
        let mut src = source(10, 3);
        let mut st = state(2);
        let mut reporter = CollectingReporter::default();
        let summary = driver.run(&mut src, &mut st, &mut reporter).unwrap();

        assert_eq!(summary.stop_reason, StopReason::Exhausted);
        assert_eq!(summary.batches_processed, 4);
        assert_eq!(summary.rows_processed, 10);
        assert_eq!(summary.updates_applied, 4);
        assert_eq!(summary.loss_series.len(), 2);
        assert_eq!(summary.loss_series[0].batch_index, 1);
        assert_eq!(summary.loss_series[1].batch_index, 3);
        assert_eq!(summary.loss_series[1].n_pairs, 4);
        assert_eq!(reporter.points, summary.loss_series);
        assert_eq!(st.estimator.n_updates(), 4);
    }

    #[test]
    fn test_stops_at_cap() {
        let driver = Driver::new(FeatureHasher::new(32).unwrap(), Some(3)).unwrap();
        let mut src = source(100, 2);
        let mut st = state(2);
        let mut reporter = CollectingReporter::default();
        let summary = driver.run(&mut src, &mut st, &mut reporter).unwrap();

        assert_eq!(summary.stop_reason, StopReason::CapReached);
        assert_eq!(summary.batches_processed, 3);
        assert_eq!(summary.loss_series.len(), 1);
        assert_eq!(src.batches_read(), 3);
    }

    #[test]
    fn test_zero_cap_rejected() {
        assert!(Driver::new(FeatureHasher::default(), Some(0)).is_err());
    }
}
