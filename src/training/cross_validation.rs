//! Cross-validation splitters and fold scoring

use super::metrics::Scoring;
use super::models::ModelFamily;
use crate::error::{KolosalError, Result};
use crate::optimizer::ParamSet;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    KFold { n_splits: usize, shuffle: bool },
    /// K-fold keeping the class proportions of every fold close to the whole
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 3, shuffle: false }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self { strategy, random_state: 42 }
    }

    /// Shorthand for an unshuffled stratified K-fold
    pub fn stratified(n_splits: usize) -> Self {
        Self::new(CVStrategy::StratifiedKFold { n_splits, shuffle: false })
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate train/test splits for `y.len()` rows
    pub fn split(&self, y: &[usize]) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        let (n_splits, shuffle) = match self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => (n_splits, shuffle),
            CVStrategy::StratifiedKFold { n_splits, shuffle } => (n_splits, shuffle),
        };
        if n_splits < 2 {
            return Err(KolosalError::ValidationError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(KolosalError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})", n_samples, n_splits
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let folds = match self.strategy {
            CVStrategy::KFold { .. } => {
                let mut indices: Vec<usize> = (0..n_samples).collect();
                if shuffle {
                    indices.shuffle(&mut rng);
                }
                let mut folds = Vec::with_capacity(n_splits);
                let mut current = 0;
                for i in 0..n_splits {
                    let size = n_samples / n_splits + usize::from(i < n_samples % n_splits);
                    folds.push(indices[current..current + size].to_vec());
                    current += size;
                }
                folds
            }
            CVStrategy::StratifiedKFold { .. } => {
                // Group samples by class, in class order
                let mut class_indices: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
                for (idx, &class) in y.iter().enumerate() {
                    class_indices.entry(class).or_default().push(idx);
                }
                if shuffle {
                    for indices in class_indices.values_mut() {
                        indices.shuffle(&mut rng);
                    }
                }
                if let Some((class, members)) = class_indices.iter().find(|(_, m)| m.len() < n_splits) {
                    tracing::warn!(
                        class,
                        members = members.len(),
                        n_splits,
                        "least populated class has fewer members than folds"
                    );
                }

                // Deal each class round-robin; the running offset keeps fold sizes balanced
                let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
                let mut offset = 0;
                for indices in class_indices.values() {
                    for (i, &idx) in indices.iter().enumerate() {
                        folds[(offset + i) % n_splits].push(idx);
                    }
                    offset += indices.len();
                }
                for fold in &mut folds {
                    fold.sort_unstable();
                }
                folds
            }
        };

        Ok((0..n_splits)
            .map(|fold_idx| CVSplit {
                test_indices: folds[fold_idx].clone(),
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
                fold_idx,
            })
            .collect())
    }
}

/// Seeded shuffle split into (train, test) index lists. The test part holds
/// `ceil(n * test_size)` rows.
pub fn train_test_split(n_samples: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(KolosalError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }
    let n_test = (n_samples as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(KolosalError::ValidationError(format!(
            "cannot split {} rows with test_size {}", n_samples, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Score one parameter set on every split; folds are fitted in parallel on the
/// current rayon pool. The first failing fold fails the whole evaluation.
pub fn cross_val_score(
    family: ModelFamily,
    params: &ParamSet,
    x: &Array2<f64>,
    y: &[usize],
    n_classes: usize,
    splits: &[CVSplit],
    scoring: Scoring,
) -> Result<Vec<f64>> {
    splits
        .par_iter()
        .map(|split| {
            let mut model = family.build(params)?;
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train: Vec<usize> = split.train_indices.iter().map(|&i| y[i]).collect();
            model.fit(&x_train, &y_train, n_classes)?;

            let x_test = x.select(Axis(0), &split.test_indices);
            let y_test: Vec<usize> = split.test_indices.iter().map(|&i| y[i]).collect();
            let proba = model.predict_proba(&x_test)?;
            let score = scoring.score(&y_test, proba.view())?;
            tracing::debug!(fold = split.fold_idx, score, "fold scored");
            Ok(score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_stratified_folds_partition_rows() {
        let y: Vec<usize> = (0..30).map(|i| if i < 20 { 0 } else { 1 }).collect();
        let splits = CrossValidator::stratified(5).split(&y).unwrap();
        assert_eq!(splits.len(), 5);

        let mut seen = HashSet::new();
        for split in &splits {
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 30);
            for &i in &split.test_indices {
                assert!(seen.insert(i), "row {} in two test folds", i);
            }
            // 4 of class 0 and 2 of class 1 per fold
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(ones, 2);
            assert_eq!(split.test_indices.len(), 6);
        }
        assert_eq!(seen.len(), 30);
    }

    #[test]
    fn test_kfold_sizes() {
        let y = vec![0; 10];
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: true }).with_random_state(1);
        let sizes: Vec<usize> = cv.split(&y).unwrap().iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(CrossValidator::stratified(5).split(&[0, 1, 0]).is_err());
        assert!(CrossValidator::stratified(1).split(&[0, 1, 0]).is_err());
    }

    #[test]
    fn test_train_test_split_is_seeded() {
        let (train, test) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(train_test_split(10, 0.2, 42).unwrap(), (train.clone(), test.clone()));

        let all: HashSet<usize> = train.iter().chain(&test).copied().collect();
        assert_eq!(all.len(), 10);
        assert!(train_test_split(10, 0.0, 42).is_err());
    }

    #[test]
    fn test_cross_val_score_runs_every_fold() {
        let n = 30;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if i % 2 == 0 { j as f64 } else { 5.0 + j as f64 });
        let y: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let splits = CrossValidator::stratified(3).split(&y).unwrap();
        let params = ModelFamily::RandomForest.default_params(5, 0);
        let scores =
            cross_val_score(ModelFamily::RandomForest, &params, &x, &y, 2, &splits, Scoring::Accuracy).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|&s| (s - 1.0).abs() < 1e-12));
    }
}
