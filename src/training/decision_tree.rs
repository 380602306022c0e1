//! CART decision trees
//!
//! One tree type serves two roles:
//! - classification trees split on Gini impurity and store the class
//!   distribution of the training rows in each leaf (random forest members)
//! - regression trees split on squared error and store one value per leaf,
//!   computed by a caller-supplied function (gradient boosting stages)

use crate::error::{KolosalError, Result};
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Class distribution, or a single value for regression trees
    Leaf {
        value: Vec<f64>,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Growth limits shared by forests and boosted ensembles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split; `None` examines all of them
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub params: TreeParams,
    n_features: usize,
    n_outputs: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(TreeParams::default())
    }
}

enum Target<'a> {
    Classes { y: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

/// Running sufficient statistics of a set of rows
#[derive(Clone)]
struct Stats {
    n: f64,
    counts: Vec<f64>,
    sum: f64,
    sum_sq: f64,
}

impl Stats {
    fn empty(target: &Target<'_>) -> Self {
        let n_classes = match target {
            Target::Classes { n_classes, .. } => *n_classes,
            Target::Values(_) => 0,
        };
        Self { n: 0.0, counts: vec![0.0; n_classes], sum: 0.0, sum_sq: 0.0 }
    }

    fn of(target: &Target<'_>, indices: &[usize]) -> Self {
        let mut stats = Self::empty(target);
        for &i in indices {
            stats.add(target, i, 1.0);
        }
        stats
    }

    fn add(&mut self, target: &Target<'_>, i: usize, sign: f64) {
        self.n += sign;
        match target {
            Target::Classes { y, .. } => self.counts[y[i]] += sign,
            Target::Values(v) => {
                self.sum += sign * v[i];
                self.sum_sq += sign * v[i] * v[i];
            }
        }
    }

    /// Impurity weighted by row count: n * gini, or the sum of squared errors
    fn cost(&self, target: &Target<'_>) -> f64 {
        if self.n <= 0.0 {
            return 0.0;
        }
        match target {
            Target::Classes { .. } => {
                self.n - self.counts.iter().map(|c| c * c).sum::<f64>() / self.n
            }
            Target::Values(_) => (self.sum_sq - self.sum * self.sum / self.n).max(0.0),
        }
    }
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

struct Builder<'a, R: Rng + ?Sized> {
    x: &'a Array2<f64>,
    target: Target<'a>,
    leaf_value: Option<&'a dyn Fn(&[usize]) -> f64>,
    params: TreeParams,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> Builder<'a, R> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let n_samples = indices.len();
        let stats = Stats::of(&self.target, &indices);
        let impurity = stats.cost(&self.target);

        let should_stop = n_samples < self.params.min_samples_split
            || n_samples < 2 * self.params.min_samples_leaf
            || self.params.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        let split = if should_stop { None } else { self.best_split(&indices, &stats, impurity) };

        match split {
            None => self.leaf(&indices, &stats),
            Some(best) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.x[[i, best.feature_idx]] <= best.threshold);
                TreeNode::Split {
                    feature_idx: best.feature_idx,
                    threshold: best.threshold,
                    left: Box::new(self.build(left, depth + 1)),
                    right: Box::new(self.build(right, depth + 1)),
                    n_samples,
                    impurity: impurity / n_samples as f64,
                }
            }
        }
    }

    fn leaf(&self, indices: &[usize], stats: &Stats) -> TreeNode {
        let value = match (&self.target, self.leaf_value) {
            (Target::Classes { .. }, _) => stats.counts.iter().map(|c| c / stats.n).collect(),
            (Target::Values(_), Some(f)) => vec![f(indices)],
            (Target::Values(_), None) => vec![stats.sum / stats.n],
        };
        TreeNode::Leaf { value, n_samples: indices.len() }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        match self.params.max_features {
            Some(m) if m < n_features => {
                rand::seq::index::sample(&mut *self.rng, n_features, m.max(1)).into_vec()
            }
            _ => (0..n_features).collect(),
        }
    }

    fn best_split(&mut self, indices: &[usize], parent: &Stats, impurity: f64) -> Option<BestSplit> {
        let min_leaf = self.params.min_samples_leaf.max(1) as f64;
        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for feature_idx in self.candidate_features() {
            let column = self.x.column(feature_idx);
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left = Stats::empty(&self.target);
            let mut right = parent.clone();

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left.add(&self.target, i, 1.0);
                right.add(&self.target, i, -1.0);

                let (here, next) = (column[i], column[order[pos + 1]]);
                if here >= next || left.n < min_leaf || right.n < min_leaf {
                    continue;
                }

                let gain = impurity - left.cost(&self.target) - right.cost(&self.target);
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { feature_idx, threshold: here + (next - here) / 2.0, gain });
                }
            }
        }

        best
    }
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self { root: None, params, n_features: 0, n_outputs: 0 }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.params.max_depth = depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.params.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.params.max_features = max_features;
        self
    }

    fn check_fit_input(&self, x: &Array2<f64>, n_targets: usize, sample: &[usize]) -> Result<()> {
        if x.nrows() != n_targets {
            return Err(KolosalError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", n_targets),
            });
        }
        if sample.is_empty() {
            return Err(KolosalError::TrainingError("cannot grow a tree from zero rows".to_string()));
        }
        if let Some(&bad) = sample.iter().find(|&&i| i >= x.nrows()) {
            return Err(KolosalError::ValidationError(format!(
                "sample index {} out of range for {} rows", bad, x.nrows()
            )));
        }
        Ok(())
    }

    /// Grow a Gini classification tree on the rows listed in `sample` (repeats allowed)
    pub fn fit_classifier<R: Rng + ?Sized>(
        &mut self,
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        sample: &[usize],
        rng: &mut R,
    ) -> Result<()> {
        self.check_fit_input(x, y.len(), sample)?;
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(KolosalError::ValidationError(format!(
                "class index {} out of range for {} classes", bad, n_classes
            )));
        }

        let mut builder = Builder {
            x,
            target: Target::Classes { y, n_classes },
            leaf_value: None,
            params: self.params,
            rng,
        };
        self.root = Some(builder.build(sample.to_vec(), 0));
        self.n_features = x.ncols();
        self.n_outputs = n_classes;
        Ok(())
    }

    /// Grow a squared-error regression tree; each leaf holds `leaf_value(rows in leaf)`
    pub fn fit_regressor<R, F>(
        &mut self,
        x: &Array2<f64>,
        targets: &[f64],
        sample: &[usize],
        rng: &mut R,
        leaf_value: F,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
        F: Fn(&[usize]) -> f64,
    {
        self.check_fit_input(x, targets.len(), sample)?;

        let mut builder = Builder {
            x,
            target: Target::Values(targets),
            leaf_value: Some(&leaf_value),
            params: self.params,
            rng,
        };
        self.root = Some(builder.build(sample.to_vec(), 0));
        self.n_features = x.ncols();
        self.n_outputs = 1;
        Ok(())
    }

    /// Leaf value reached by one row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<&[f64]> {
        let mut node = self.root.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        if row.len() != self.n_features {
            return Err(KolosalError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", row.len()),
            });
        }
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(value),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Leaf values of every row: class distributions, or one column for regression trees
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((x.nrows(), self.n_outputs));
        for (i, row) in x.rows().into_iter().enumerate() {
            let value = self.predict_row(row)?;
            for (k, &v) in value.iter().enumerate() {
                out[[i, k]] = v;
            }
        }
        Ok(out)
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_classifier_separates_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = DecisionTree::default();
        tree.fit_classifier(&x, &y, 2, &[0, 1, 2, 3, 4, 5], &mut rng).unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        let proba = tree.predict(&array![[0.0], [20.0], [6.4]]).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![1.0, 0.0]);
        assert_eq!(proba.row(1).to_vec(), vec![0.0, 1.0]);
        // midpoint threshold is 6.5
        assert_eq!(proba.row(2).to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_leaf_holds_class_distribution() {
        let x = array![[0.0], [0.0], [0.0], [0.0]];
        let y = [0, 1, 1, 2];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = DecisionTree::default();
        tree.fit_classifier(&x, &y, 3, &[0, 1, 2, 3], &mut rng).unwrap();
        let proba = tree.predict(&array![[0.0]]).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![0.25, 0.5, 0.25]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = [0, 1, 0, 1, 0, 1, 0, 1];
        let sample: Vec<usize> = (0..8).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = DecisionTree::default().with_max_depth(Some(2));
        tree.fit_classifier(&x, &y, 2, &sample, &mut rng).unwrap();
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_regressor_uses_leaf_function() {
        let x = array![[1.0], [2.0], [10.0], [11.0]];
        let targets = [1.0, 1.0, 5.0, 5.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = DecisionTree::default().with_max_depth(Some(1));
        tree.fit_regressor(&x, &targets, &[0, 1, 2, 3], &mut rng, |rows: &[usize]| {
            rows.iter().map(|&i| targets[i]).sum::<f64>() * 10.0
        })
        .unwrap();
        let out = tree.predict(&array![[0.0], [12.0]]).unwrap();
        assert_eq!(out[[0, 0]], 20.0);
        assert_eq!(out[[1, 0]], 100.0);
    }

    #[test]
    fn test_unfitted_and_shape_errors() {
        let tree = DecisionTree::default();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(KolosalError::ModelNotFitted)));

        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut tree = DecisionTree::default();
        assert!(tree.fit_classifier(&x, &[0], 2, &[0], &mut rng).is_err());
        tree.fit_classifier(&x, &[0, 1], 2, &[0, 1], &mut rng).unwrap();
        assert!(tree.predict(&array![[1.0]]).is_err());
    }
}
