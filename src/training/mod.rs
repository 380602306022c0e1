//! Model training module
//!
//! Two kinds of models live here:
//! - incremental classifiers, updated one batch at a time from hashed sparse
//!   features ([`IncrementalClassifier`], implemented by [`SGDClassifier`])
//! - batch classifiers over dense numeric tables, used by the hyper-parameter
//!   search ([`Classifier`], built from a [`ModelFamily`])
//!
//! Supporting pieces: decision trees, cross-validation splitters and metrics.

pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod metrics;
mod models;
pub mod random_forest;
pub mod sgd;

pub use cross_validation::{cross_val_score, train_test_split, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{DecisionTree, TreeNode, TreeParams};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use metrics::{accuracy, f1_score, log_loss, ClassificationMetrics, Scoring};
pub use models::{Classifier, ModelFamily};
pub use random_forest::{MaxFeatures, RandomForestClassifier};
pub use sgd::{LearningRateSchedule, SGDClassifier, SGDConfig, SGDLoss};

use crate::error::Result;
use crate::feature_engineering::SparseMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A model that learns from one batch at a time and never revisits old batches
pub trait IncrementalClassifier {
    /// Class labels the model was initialized with, in probability-column order
    fn classes(&self) -> &[String];

    /// Exactly one epoch over the given batch
    fn partial_fit(&mut self, x: &SparseMatrix, y: &[String]) -> Result<()>;

    /// One probability per class per row; rows sum to 1. Valid before any update.
    fn predict_proba(&self, x: &SparseMatrix) -> Result<Array2<f64>>;

    /// Number of updates applied so far
    fn n_updates(&self) -> u64;
}

/// Incremental estimator choice, selected once from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorKind {
    Sgd(SGDConfig),
}

impl Default for EstimatorKind {
    fn default() -> Self {
        EstimatorKind::Sgd(SGDConfig::default())
    }
}

impl EstimatorKind {
    pub fn build(&self, classes: &[String], n_features: usize) -> Result<Estimator> {
        match self {
            EstimatorKind::Sgd(config) => {
                Ok(Estimator::Sgd(SGDClassifier::new(config.clone(), classes, n_features)?))
            }
        }
    }
}

/// A built incremental estimator
#[derive(Debug, Clone)]
pub enum Estimator {
    Sgd(SGDClassifier),
}

impl Estimator {
    /// Multi-epoch fit from scratch; returns the number of epochs run
    pub fn fit(&mut self, x: &SparseMatrix, y: &[String]) -> Result<usize> {
        match self {
            Estimator::Sgd(model) => model.fit(x, y),
        }
    }

    /// Most probable class per row
    pub fn predict(&self, x: &SparseMatrix) -> Result<Vec<String>> {
        match self {
            Estimator::Sgd(model) => model.predict(x),
        }
    }
}

impl IncrementalClassifier for Estimator {
    fn classes(&self) -> &[String] {
        match self {
            Estimator::Sgd(model) => model.classes(),
        }
    }

    fn partial_fit(&mut self, x: &SparseMatrix, y: &[String]) -> Result<()> {
        match self {
            Estimator::Sgd(model) => model.partial_fit(x, y),
        }
    }

    fn predict_proba(&self, x: &SparseMatrix) -> Result<Array2<f64>> {
        match self {
            Estimator::Sgd(model) => model.predict_proba(x),
        }
    }

    fn n_updates(&self) -> u64 {
        match self {
            Estimator::Sgd(model) => model.n_updates(),
        }
    }
}
