//! Classification metrics

use crate::error::{KolosalError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Probabilities are clipped to [EPS, 1 - EPS] before taking the log
const EPS: f64 = 1e-15;

/// Metric used to score a model; higher is better for every variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    NegLogLoss,
    Accuracy,
}

impl Scoring {
    pub fn score(&self, y_true: &[usize], proba: ArrayView2<'_, f64>) -> Result<f64> {
        match self {
            Scoring::NegLogLoss => log_loss(y_true, proba).map(|l| -l),
            Scoring::Accuracy => Ok(accuracy(y_true, &argmax_rows(proba))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scoring::NegLogLoss => "neg_log_loss",
            Scoring::Accuracy => "accuracy",
        }
    }
}

impl std::str::FromStr for Scoring {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "neg_log_loss" => Ok(Scoring::NegLogLoss),
            "accuracy" => Ok(Scoring::Accuracy),
            other => Err(KolosalError::ConfigError(format!("Unknown scoring: {}", other))),
        }
    }
}

/// Mean negative log-likelihood of the true class.
///
/// `y_true[i]` indexes a column of `proba`. Rows are normalized before
/// clipping. A label outside the probability columns is an error.
pub fn log_loss(y_true: &[usize], proba: ArrayView2<'_, f64>) -> Result<f64> {
    if y_true.len() != proba.nrows() {
        return Err(KolosalError::ShapeError {
            expected: format!("{} probability rows", y_true.len()),
            actual: format!("{} probability rows", proba.nrows()),
        });
    }
    if y_true.is_empty() {
        return Err(KolosalError::ComputationError("log-loss of an empty sample".to_string()));
    }

    let mut total = 0.0;
    for (&label, row) in y_true.iter().zip(proba.rows()) {
        if label >= row.len() {
            return Err(KolosalError::ComputationError(format!(
                "label index {} outside {} probability columns", label, row.len()
            )));
        }
        let sum = row.sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return Err(KolosalError::ComputationError(format!(
                "invalid probability row (sum = {})", sum
            )));
        }
        let p = (row[label] / sum).clamp(EPS, 1.0 - EPS);
        total -= p.ln();
    }
    Ok(total / y_true.len() as f64)
}

pub fn argmax_rows(proba: ArrayView2<'_, f64>) -> Vec<usize> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (k, &p)| if p > best.1 { (k, p) } else { best })
                .0
        })
        .collect()
}

pub fn accuracy<T: PartialEq>(y_true: &[T], y_pred: &[T]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Binary F1 score of `positive`
pub fn f1_score<T: PartialEq>(y_true: &[T], y_pred: &[T], positive: &T) -> f64 {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (t, p) in y_true.iter().zip(y_pred) {
        match (t == positive, p == positive) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
    let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Validation metrics reported after a warm-up fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    /// Share of the majority class, the accuracy of a constant predictor
    pub baseline: f64,
    pub accuracy: f64,
    pub f1_score: f64,
    pub log_loss: f64,
    pub n_samples: usize,
}
