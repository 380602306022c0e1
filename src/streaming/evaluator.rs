//! Windowed log-loss evaluation
//!
//! Pairs of (true label, predicted probabilities) accumulate across batches.
//! When K batches have accumulated since the last flush, the window's
//! log-loss is appended to the loss series and the accumulators are cleared.
//! A trailing partial window is never flushed.

use crate::error::{KolosalError, Result};
use crate::training::metrics::log_loss;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// One loss series entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossPoint {
    /// Index of the batch that closed the window
    pub batch_index: u64,
    pub loss: f64,
    /// Number of (label, probability) pairs the loss was computed over
    pub n_pairs: usize,
}

/// Append-only sequence of window losses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossSeries {
    points: Vec<LossPoint>,
}

impl LossSeries {
    pub fn points(&self) -> &[LossPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&LossPoint> {
        self.points.last()
    }

    fn push(&mut self, point: LossPoint) {
        self.points.push(point);
    }
}

#[derive(Debug, Clone)]
pub struct WindowedEvaluator {
    window_size: usize,
    classes: Vec<String>,
    /// Class index per accumulated row
    labels: Vec<usize>,
    /// Row-major probabilities, `classes.len()` per accumulated row
    proba: Vec<f64>,
    batches_in_window: usize,
    series: LossSeries,
}

impl WindowedEvaluator {
    pub fn new(window_size: usize, classes: &[String]) -> Result<Self> {
        if window_size == 0 {
            return Err(KolosalError::InvalidParameter {
                name: "window_size".to_string(),
                value: "0".to_string(),
                reason: "a window spans at least one batch".to_string(),
            });
        }
        Ok(Self {
            window_size,
            classes: classes.to_vec(),
            labels: Vec::new(),
            proba: Vec::new(),
            batches_in_window: 0,
            series: LossSeries::default(),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Batches accumulated since the last flush
    pub fn pending_batches(&self) -> usize {
        self.batches_in_window
    }

    /// Pairs accumulated since the last flush
    pub fn pending_pairs(&self) -> usize {
        self.labels.len()
    }

    pub fn series(&self) -> &LossSeries {
        &self.series
    }

    /// Accumulate one batch. Returns the new loss entry when this batch closes a window.
    ///
    /// A label outside the class set is a computation error; nothing from the
    /// offending batch is accumulated.
    /// A window that closes without any pairs has no loss and is a computation error too.
    pub fn record(&mut self, batch_index: u64, labels: &[String], proba: &Array2<f64>) -> Result<Option<LossPoint>> {
        let n_classes = self.classes.len();
        if proba.nrows() != labels.len() || proba.ncols() != n_classes {
            return Err(KolosalError::ShapeError {
                expected: format!("({}, {})", labels.len(), n_classes),
                actual: format!("({}, {})", proba.nrows(), proba.ncols()),
            });
        }

        let indices = labels
            .iter()
            .map(|label| {
                self.classes.iter().position(|c| c == label).ok_or_else(|| {
                    KolosalError::ComputationError(format!(
                        "label '{}' in batch {} is not in the class set {:?}",
                        label, batch_index, self.classes
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        self.labels.extend(indices);
        self.proba.extend(proba.iter().copied());
        self.batches_in_window += 1;

        if self.batches_in_window < self.window_size {
            return Ok(None);
        }
        self.flush(batch_index).map(Some)
    }

    fn flush(&mut self, batch_index: u64) -> Result<LossPoint> {
        let n_pairs = self.labels.len();
        let view = ArrayView2::from_shape((n_pairs, self.classes.len()), &self.proba[..])?;
        let loss = log_loss(&self.labels, view)?;

        let point = LossPoint { batch_index, loss, n_pairs };
        self.series.push(point);
        self.labels.clear();
        self.proba.clear();
        self.batches_in_window = 0;
        tracing::debug!(batch_index, loss, n_pairs, "window flushed");
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn classes() -> Vec<String> {
        vec!["0".to_string(), "1".to_string()]
    }

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flushes_every_k_batches() {
        let mut eval = WindowedEvaluator::new(2, &classes()).unwrap();
        let p = array![[0.5, 0.5]];
        assert!(eval.record(0, &labels(&["0"]), &p).unwrap().is_none());
        assert_eq!(eval.pending_batches(), 1);
        let point = eval.record(1, &labels(&["1"]), &p).unwrap().unwrap();
        assert_eq!(point.batch_index, 1);
        assert_eq!(point.n_pairs, 2);
        assert!((point.loss - 2f64.ln()).abs() < 1e-12);
        assert_eq!(eval.pending_pairs(), 0);
        assert_eq!(eval.pending_batches(), 0);

        assert!(eval.record(2, &labels(&["1"]), &p).unwrap().is_none());
        assert_eq!(eval.series().len(), 1);
    }

    #[test]
    fn test_window_of_one() {
        let mut eval = WindowedEvaluator::new(1, &classes()).unwrap();
        let p = array![[0.9, 0.1], [0.2, 0.8]];
        for i in 0..3 {
            let point = eval.record(i, &labels(&["0", "1"]), &p).unwrap().unwrap();
            assert_eq!(point.n_pairs, 2);
            assert_eq!(point.batch_index, i);
        }
        assert_eq!(eval.series().len(), 3);
    }

    #[test]
    fn test_unknown_label_is_computation_error() {
        let mut eval = WindowedEvaluator::new(3, &classes()).unwrap();
        let p = array![[0.5, 0.5]];
        assert!(matches!(
            eval.record(0, &labels(&["2"]), &p),
            Err(KolosalError::ComputationError(_))
        ));
        assert_eq!(eval.pending_pairs(), 0);
        assert_eq!(eval.pending_batches(), 0);
    }

    #[test]
    fn test_pairs_stay_aligned() {
        let mut eval = WindowedEvaluator::new(5, &classes()).unwrap();
        let p = array![[0.5, 0.5], [0.5, 0.5], [0.5, 0.5]];
        eval.record(0, &labels(&["0", "1", "0"]), &p).unwrap();
        assert_eq!(eval.pending_pairs(), 3);
        assert_eq!(eval.proba.len(), 3 * 2);
        assert!(eval.record(1, &labels(&["0"]), &p).is_err());
        assert_eq!(eval.pending_pairs(), 3);
    }

    #[test]
    fn test_window_without_pairs_is_computation_error() {
        let mut eval = WindowedEvaluator::new(2, &classes()).unwrap();
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(eval.record(0, &[], &empty).unwrap().is_none());
        assert!(matches!(eval.record(1, &[], &empty), Err(KolosalError::ComputationError(_))));
        assert!(eval.series().is_empty());
    }

    #[test]
    fn test_empty_batch_inside_window_is_ignored() {
        let mut eval = WindowedEvaluator::new(2, &classes()).unwrap();
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(eval.record(0, &[], &empty).unwrap().is_none());
        let point = eval.record(1, &labels(&["1"]), &array![[0.5, 0.5]]).unwrap().unwrap();
        assert_eq!(point.n_pairs, 1);
        assert!(point.loss.is_finite());
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(WindowedEvaluator::new(0, &classes()).is_err());
    }
}
