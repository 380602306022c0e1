//! Stochastic Gradient Descent (SGD) classifier over sparse hashed features
//!
//! Linear model trained one sample at a time. Binary problems use a single
//! weight vector; more classes are handled one-vs-rest. L2 regularization is
//! applied through a shared weight scale so a sample update costs O(nnz).

use super::IncrementalClassifier;
use crate::error::{KolosalError, Result};
use crate::feature_engineering::{SparseMatrix, SparseRow};
use crate::utils::compare_labels;
use ndarray::Array2;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Intercept updates on sparse data are damped, the bias sees every sample
const SPARSE_INTERCEPT_DECAY: f64 = 0.01;
const MIN_WEIGHT_SCALE: f64 = 1e-9;
const MAX_DLOSS: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SGDLoss {
    Log,            // Logistic regression
    ModifiedHuber,  // Smooth hinge with probability estimates
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningRateSchedule {
    Constant,
    Optimal,     // 1 / (alpha * (t + t0))
    InvScaling,  // eta0 / t^power_t
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SGDConfig {
    pub loss: SGDLoss,
    pub learning_rate: LearningRateSchedule,
    pub eta0: f64,
    pub alpha: f64,         // L2 regularization
    pub power_t: f64,       // For InvScaling schedule
    pub max_iter: usize,    // Epoch cap for full fits
    pub tol: f64,
    pub n_iter_no_change: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for SGDConfig {
    fn default() -> Self {
        Self {
            loss: SGDLoss::Log,
            learning_rate: LearningRateSchedule::Optimal,
            eta0: 0.01,
            alpha: 0.0001,
            power_t: 0.5,
            max_iter: 100,
            tol: 1e-3,
            n_iter_no_change: 5,
            shuffle: true,
            random_state: Some(42),
        }
    }
}

impl SGDConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0) && self.learning_rate == LearningRateSchedule::Optimal {
            return Err(KolosalError::InvalidParameter {
                name: "alpha".to_string(),
                value: self.alpha.to_string(),
                reason: "the optimal schedule needs alpha > 0".to_string(),
            });
        }
        if self.learning_rate != LearningRateSchedule::Optimal && !(self.eta0 > 0.0) {
            return Err(KolosalError::InvalidParameter {
                name: "eta0".to_string(),
                value: self.eta0.to_string(),
                reason: "constant and invscaling schedules need eta0 > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl SGDLoss {
    /// Derivative of the loss w.r.t. the margin `p`, for `y` in {-1, +1}
    fn dloss(self, p: f64, y: f64) -> f64 {
        let z = p * y;
        match self {
            SGDLoss::Log => {
                if z > 18.0 {
                    -y * (-z).exp()
                } else if z < -18.0 {
                    -y
                } else {
                    -y / (z.exp() + 1.0)
                }
            }
            SGDLoss::ModifiedHuber => {
                if z >= 1.0 {
                    0.0
                } else if z >= -1.0 {
                    -2.0 * (1.0 - z) * y
                } else {
                    -4.0 * y
                }
            }
        }
    }

    fn loss(self, p: f64, y: f64) -> f64 {
        let z = p * y;
        match self {
            SGDLoss::Log => {
                if z > 18.0 {
                    (-z).exp()
                } else if z < -18.0 {
                    -z
                } else {
                    (1.0 + (-z).exp()).ln()
                }
            }
            SGDLoss::ModifiedHuber => {
                if z >= 1.0 {
                    0.0
                } else if z >= -1.0 {
                    (1.0 - z) * (1.0 - z)
                } else {
                    -4.0 * z
                }
            }
        }
    }
}

/// One binary linear problem: `w = scale * coef`
#[derive(Debug, Clone)]
struct BinaryWeights {
    coef: Vec<f64>,
    scale: f64,
    intercept: f64,
}

impl BinaryWeights {
    fn new(n_features: usize) -> Self {
        Self { coef: vec![0.0; n_features], scale: 1.0, intercept: 0.0 }
    }

    fn margin(&self, row: &SparseRow<'_>) -> f64 {
        row.dot(&self.coef) * self.scale + self.intercept
    }

    fn shrink(&mut self, factor: f64) {
        self.scale *= factor;
        if self.scale < MIN_WEIGHT_SCALE {
            let scale = self.scale;
            self.coef.iter_mut().for_each(|w| *w *= scale);
            self.scale = 1.0;
        }
    }

    fn add(&mut self, row: &SparseRow<'_>, step: f64) {
        let step = step / self.scale;
        for (j, v) in row.iter() {
            self.coef[j] += step * v;
        }
    }
}

/// Linear SGD classifier with a fixed class set
#[derive(Debug, Clone)]
pub struct SGDClassifier {
    pub config: SGDConfig,
    classes: Vec<String>,
    n_features: usize,
    weights: Vec<BinaryWeights>,
    /// Samples seen, starting at 1
    t: f64,
    n_updates: u64,
    rng: Xoshiro256PlusPlus,
}

impl SGDClassifier {
    /// Initialize an untrained model for `classes` over `n_features` hashed columns
    pub fn new(config: SGDConfig, classes: &[String], n_features: usize) -> Result<Self> {
        config.validate()?;

        let mut classes = classes.to_vec();
        classes.sort_by(|a, b| compare_labels(a, b));
        classes.dedup();
        if classes.len() < 2 {
            return Err(KolosalError::InvalidParameter {
                name: "classes".to_string(),
                value: format!("{:?}", classes),
                reason: "at least two distinct classes are required".to_string(),
            });
        }
        if n_features == 0 {
            return Err(KolosalError::InvalidParameter {
                name: "n_features".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let n_problems = if classes.len() == 2 { 1 } else { classes.len() };
        let rng = Xoshiro256PlusPlus::seed_from_u64(config.random_state.unwrap_or(42));

        Ok(Self {
            config,
            classes,
            n_features,
            weights: (0..n_problems).map(|_| BinaryWeights::new(n_features)).collect(),
            t: 1.0,
            n_updates: 0,
            rng,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Reset the learned parameters, keeping configuration and classes
    pub fn reset(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = BinaryWeights::new(self.n_features));
        self.t = 1.0;
        self.n_updates = 0;
        self.rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
    }

    fn optimal_init(&self) -> f64 {
        let typw = (1.0 / self.config.alpha.sqrt()).sqrt();
        let initial_eta0 = typw / self.config.loss.dloss(-typw, 1.0).max(1.0);
        1.0 / (initial_eta0 * self.config.alpha)
    }

    fn eta(&self, t: f64, optimal_init: f64) -> f64 {
        match self.config.learning_rate {
            LearningRateSchedule::Constant => self.config.eta0,
            LearningRateSchedule::Optimal => 1.0 / (self.config.alpha * (optimal_init + t - 1.0)),
            LearningRateSchedule::InvScaling => self.config.eta0 / t.powf(self.config.power_t),
        }
    }

    fn check_input(&self, x: &SparseMatrix) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(KolosalError::ShapeError {
                expected: format!("{} columns", self.n_features),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok(())
    }

    fn encode_labels(&self, y: &[String]) -> Result<Vec<usize>> {
        y.iter()
            .map(|label| {
                self.classes.iter().position(|c| c == label).ok_or_else(|| {
                    KolosalError::ValidationError(format!(
                        "label '{}' is not one of the initialized classes {:?}",
                        label, self.classes
                    ))
                })
            })
            .collect()
    }

    /// One pass over the rows; returns the mean loss over all binary problems
    fn run_epoch(&mut self, x: &SparseMatrix, y: &[usize]) -> f64 {
        let n = x.nrows();
        let mut order: Vec<usize> = (0..n).collect();
        if self.config.shuffle {
            order.shuffle(&mut self.rng);
        }

        let optimal_init = self.optimal_init();
        let binary = self.weights.len() == 1;
        let loss = self.config.loss;
        let alpha = self.config.alpha;
        let mut total_loss = 0.0;

        for k in 0..self.weights.len() {
            let positive = if binary { 1 } else { k };
            let mut t = self.t;
            for &i in &order {
                let row = x.row(i);
                let target = if y[i] == positive { 1.0 } else { -1.0 };
                let eta = self.eta(t, optimal_init);
                let w = &mut self.weights[k];

                let p = w.margin(&row);
                total_loss += loss.loss(p, target);
                let dloss = loss.dloss(p, target).clamp(-MAX_DLOSS, MAX_DLOSS);
                let update = -eta * dloss;

                w.shrink((1.0 - eta * alpha).max(0.0));
                if update != 0.0 {
                    w.add(&row, update);
                    w.intercept += update * SPARSE_INTERCEPT_DECAY;
                }
                t += 1.0;
            }
        }

        self.t += n as f64;
        total_loss / (n * self.weights.len()).max(1) as f64
    }

    /// Train from scratch for up to `max_iter` epochs, stopping once the epoch
    /// loss has not improved by `tol` for `n_iter_no_change` epochs.
    /// Returns the number of epochs run.
    pub fn fit(&mut self, x: &SparseMatrix, y: &[String]) -> Result<usize> {
        self.check_input(x)?;
        if x.nrows() != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(KolosalError::TrainingError("Empty dataset".into()));
        }

        let y_idx = self.encode_labels(y)?;
        self.reset();

        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut epochs = 0;
        for _ in 0..self.config.max_iter {
            let epoch_loss = self.run_epoch(x, &y_idx);
            epochs += 1;
            if epoch_loss > best_loss - self.config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            best_loss = best_loss.min(epoch_loss);
            if no_improvement >= self.config.n_iter_no_change {
                break;
            }
        }
        self.n_updates += epochs as u64;

        tracing::debug!(epochs, loss = best_loss, "SGD fit finished");
        Ok(epochs)
    }

    /// Raw margins, one column per binary problem
    pub fn decision_function(&self, x: &SparseMatrix) -> Result<Array2<f64>> {
        self.check_input(x)?;
        let mut scores = Array2::zeros((x.nrows(), self.weights.len()));
        for (i, row) in x.rows().enumerate() {
            for (k, w) in self.weights.iter().enumerate() {
                scores[[i, k]] = w.margin(&row);
            }
        }
        Ok(scores)
    }

    /// Most probable class per row
    pub fn predict(&self, x: &SparseMatrix) -> Result<Vec<String>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::MIN), |acc, (k, &p)| if p > acc.1 { (k, p) } else { acc })
                    .0;
                self.classes[best].clone()
            })
            .collect())
    }
}

impl IncrementalClassifier for SGDClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn partial_fit(&mut self, x: &SparseMatrix, y: &[String]) -> Result<()> {
        self.check_input(x)?;
        if x.nrows() != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        let y_idx = self.encode_labels(y)?;
        if !y_idx.is_empty() {
            self.run_epoch(x, &y_idx);
        }
        self.n_updates += 1;
        Ok(())
    }

    fn predict_proba(&self, x: &SparseMatrix) -> Result<Array2<f64>> {
        let scores = self.decision_function(x)?;
        let n_classes = self.classes.len();
        let mut proba = Array2::zeros((x.nrows(), n_classes));

        let to_prob = |margin: f64| match self.config.loss {
            SGDLoss::Log => sigmoid(margin),
            SGDLoss::ModifiedHuber => (margin.clamp(-1.0, 1.0) + 1.0) / 2.0,
        };

        for i in 0..x.nrows() {
            if self.weights.len() == 1 {
                let p = to_prob(scores[[i, 0]]);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            } else {
                let mut sum = 0.0;
                for k in 0..n_classes {
                    let p = to_prob(scores[[i, k]]);
                    proba[[i, k]] = p;
                    sum += p;
                }
                for k in 0..n_classes {
                    proba[[i, k]] = if sum > 0.0 { proba[[i, k]] / sum } else { 1.0 / n_classes as f64 };
                }
            }
        }
        Ok(proba)
    }

    fn n_updates(&self) -> u64 {
        self.n_updates
    }
}

fn sigmoid(x: f64) -> f64 { 1.0 / (1.0 + (-x).exp()) }
