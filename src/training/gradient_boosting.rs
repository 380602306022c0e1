//! Gradient boosted trees for multiclass classification
//!
//! Softmax (multinomial deviance) boosting: each round fits one squared-error
//! regression tree per class to the residual `onehot - p`, then replaces the
//! leaf values with a single Newton step:
//!
//! `value = (K - 1) / K * sum(r) / sum(|r| * (1 - |r|))`
//!
//! Raw scores start at the log of the class priors.

use ndarray::{Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::{DecisionTree, TreeParams};
use super::models::Classifier;
use super::random_forest::MaxFeatures;
use crate::error::{KolosalError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each round
    pub subsample: f64,
    pub max_features: MaxFeatures,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: MaxFeatures::All,
            random_state: 42,
        }
    }
}

impl GradientBoostingConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| KolosalError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", "0".into(), "at least one round is required"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate.to_string(), "must be positive"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid("subsample", self.subsample.to_string(), "must be in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub config: GradientBoostingConfig,
    /// `stages[m][k]` is the tree for class k in round m
    stages: Vec<Vec<DecisionTree>>,
    init_scores: Vec<f64>,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self { config, stages: Vec::new(), init_scores: Vec::new() }
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let n_sub = ((n as f64 * self.config.subsample) as usize).max(1);
        let mut indices = rand::seq::index::sample(rng, n, n_sub).into_vec();
        indices.sort_unstable();
        indices
    }

    /// Raw additive scores, one column per class
    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n_classes = self.init_scores.len();
        let mut scores = Array2::zeros((x.nrows(), n_classes));
        for (k, &init) in self.init_scores.iter().enumerate() {
            scores.column_mut(k).fill(init);
        }
        for stage in &self.stages {
            for (k, tree) in stage.iter().enumerate() {
                let update = tree.predict(x)?;
                scores
                    .column_mut(k)
                    .scaled_add(self.config.learning_rate, &update.column(0));
            }
        }
        Ok(scores)
    }
}

fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        self.config.validate()?;
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_classes < 2 {
            return Err(KolosalError::TrainingError(format!(
                "need rows from at least two classes, got {} rows and {} classes",
                n_samples, n_classes
            )));
        }

        // Log priors, with empty classes held at a large negative score
        let mut counts = vec![0.0; n_classes];
        for &c in y {
            if c >= n_classes {
                return Err(KolosalError::ValidationError(format!(
                    "class index {} out of range for {} classes", c, n_classes
                )));
            }
            counts[c] += 1.0;
        }
        self.init_scores = counts
            .iter()
            .map(|&c| if c > 0.0 { (c / n_samples as f64).ln() } else { -1e3 })
            .collect();
        self.stages.clear();

        let params = TreeParams {
            max_depth: Some(self.config.max_depth),
            min_samples_split: 2,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(self.config.max_features.resolve(x.ncols())),
        };
        let factor = (n_classes as f64 - 1.0) / n_classes as f64;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let mut scores = Array2::zeros((n_samples, n_classes));
        for (k, &init) in self.init_scores.iter().enumerate() {
            scores.column_mut(k).fill(init);
        }

        for _ in 0..self.config.n_estimators {
            let mut proba = scores.clone();
            softmax_rows(&mut proba);
            let sample = self.subsample_indices(n_samples, &mut rng);
            let seeds: Vec<u64> = (0..n_classes).map(|_| rng.gen()).collect();

            // One tree per class; classes are independent within a round
            let stage: Vec<DecisionTree> = (0..n_classes)
                .into_par_iter()
                .map(|k| {
                    let residual: Vec<f64> = (0..n_samples)
                        .map(|i| (if y[i] == k { 1.0 } else { 0.0 }) - proba[[i, k]])
                        .collect();
                    let mut tree_rng = Xoshiro256PlusPlus::seed_from_u64(seeds[k]);
                    let mut tree = DecisionTree::new(params);
                    tree.fit_regressor(x, &residual, &sample, &mut tree_rng, |rows: &[usize]| {
                        let num: f64 = rows.iter().map(|&i| residual[i]).sum();
                        let den: f64 = rows
                            .iter()
                            .map(|&i| residual[i].abs() * (1.0 - residual[i].abs()))
                            .sum();
                        if den.abs() < 1e-150 { 0.0 } else { factor * num / den }
                    })?;
                    Ok(tree)
                })
                .collect::<Result<_>>()?;

            for (k, tree) in stage.iter().enumerate() {
                let update = tree.predict(x)?;
                scores
                    .column_mut(k)
                    .scaled_add(self.config.learning_rate, &update.column(0));
            }
            self.stages.push(stage);
        }

        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stages.is_empty() {
            return Err(KolosalError::ModelNotFitted);
        }
        let mut scores = self.raw_scores(x)?;
        softmax_rows(&mut scores);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::log_loss;

    fn three_blobs() -> (Array2<f64>, Vec<usize>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let class = i % 3;
            let jitter = (i as f64 * 0.71).cos() * 0.5;
            rows.extend_from_slice(&[class as f64 * 3.0 + jitter, jitter]);
            y.push(class);
        }
        (Array2::from_shape_vec((60, 2), rows).unwrap(), y)
    }

    #[test]
    fn test_boosting_reduces_log_loss() {
        let (x, y) = three_blobs();
        let mut short = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 1,
            ..Default::default()
        });
        let mut long = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 20,
            ..Default::default()
        });
        short.fit(&x, &y, 3).unwrap();
        long.fit(&x, &y, 3).unwrap();

        let short_loss = log_loss(&y, short.predict_proba(&x).unwrap().view()).unwrap();
        let long_loss = log_loss(&y, long.predict_proba(&x).unwrap().view()).unwrap();
        assert!(long_loss < short_loss);
        assert_eq!(long.n_stages(), 20);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = three_blobs();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 5,
            subsample: 0.7,
            ..Default::default()
        });
        model.fit(&x, &y, 3).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (60, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_subsample_rejected() {
        let (x, y) = three_blobs();
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            subsample: 0.0,
            ..Default::default()
        });
        assert!(matches!(model.fit(&x, &y, 3), Err(KolosalError::InvalidParameter { .. })));
    }
}
