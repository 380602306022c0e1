//! Search configuration

use super::search_space::{ParamValue, SearchSpace};
use super::SamplerType;
use crate::error::{KolosalError, Result};
use crate::training::{ModelFamily, Scoring};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a hyperparameter search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of trials to run
    pub evals: usize,

    /// Cross-validation folds per trial
    pub folds: usize,

    pub scoring: Scoring,

    /// Trees per model; fixed, not searched
    pub n_trees: usize,

    pub family: ModelFamily,

    pub strategy: SamplerType,

    /// Random trials before TPE starts modelling the history
    pub n_startup_trials: usize,

    /// Distributions of the searched hyperparameters
    pub hp_dist: SearchSpace,

    /// Name of the target column in the dataset
    pub target_column: String,

    pub seed: u64,

    /// Worker threads for fold fitting; 0 uses every core
    pub n_jobs: usize,

    /// Trials listed in the report
    pub top_n: usize,

    /// Directory the study is written to
    pub output_dir: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            evals: 4,
            folds: 3,
            scoring: Scoring::NegLogLoss,
            n_trees: 10,
            family: ModelFamily::RandomForest,
            strategy: SamplerType::Random,
            n_startup_trials: 10,
            hp_dist: Self::default_space(ModelFamily::RandomForest),
            target_column: "target".to_string(),
            seed: 42,
            n_jobs: 0,
            top_n: 3,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search space used when no `hp_dist` is configured
    pub fn default_space(family: ModelFamily) -> SearchSpace {
        match family {
            ModelFamily::RandomForest => SearchSpace::new()
                .int("max_depth", 2, 11)
                .float("max_features", 0.1, 1.0)
                .choice("bootstrap", vec![ParamValue::Bool(true), ParamValue::Bool(false)]),
            ModelFamily::GradientBoosting => SearchSpace::new()
                .int("max_depth", 2, 6)
                .float("learning_rate", 0.01, 0.3)
                .float("subsample", 0.5, 1.0)
                .float("max_features", 0.1, 1.0),
        }
    }

    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: SearchConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_evals(mut self, n: usize) -> Self {
        self.evals = n;
        self
    }

    pub fn with_folds(mut self, n: usize) -> Self {
        self.folds = n;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_family(mut self, family: ModelFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_strategy(mut self, strategy: SamplerType) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_hp_dist(mut self, space: SearchSpace) -> Self {
        self.hp_dist = space;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_n_trees(mut self, n: usize) -> Self {
        self.n_trees = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.evals == 0 {
            return Err(KolosalError::ConfigError("evals must be at least 1".to_string()));
        }
        if self.folds < 2 {
            return Err(KolosalError::ConfigError("folds must be at least 2".to_string()));
        }
        if self.n_trees == 0 {
            return Err(KolosalError::ConfigError("n_trees must be at least 1".to_string()));
        }
        if self.hp_dist.is_empty() {
            return Err(KolosalError::ConfigError("hp_dist is empty".to_string()));
        }
        self.hp_dist.validate()
    }

    /// `<output_dir>/<strategy>_search_<dataset>.json`
    pub fn study_path(&self, dataset: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_search_{}.json", self.strategy.name(), dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.evals, 4);
        assert_eq!(config.folds, 3);
        assert_eq!(config.n_trees, 10);
        assert_eq!(config.hp_dist.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SearchConfig = serde_json::from_str(
            r#"{"evals": 10, "strategy": "tpe", "family": "gb", "scoring": "accuracy",
                "hp_dist": {"learning_rate": {"type": "float", "min": 0.01, "max": 0.3}}}"#,
        )
        .unwrap();
        assert_eq!(config.evals, 10);
        assert_eq!(config.folds, 3);
        assert_eq!(config.strategy, SamplerType::Tpe);
        assert_eq!(config.family, ModelFamily::GradientBoosting);
        assert_eq!(config.scoring, Scoring::Accuracy);
        assert_eq!(config.hp_dist.len(), 1);
    }

    #[test]
    fn test_builder_and_validation() {
        let config = SearchConfig::new().with_evals(0);
        assert!(config.validate().is_err());
        let config = SearchConfig::new().with_folds(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_space_builds_each_family() {
        use rand::SeedableRng;
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(3);
        for family in [ModelFamily::RandomForest, ModelFamily::GradientBoosting] {
            let space = SearchConfig::default_space(family);
            for _ in 0..10 {
                let mut params = family.default_params(5, 1);
                params.extend(space.sample(&mut rng));
                assert!(family.build(&params).is_ok(), "{} rejected {:?}", family, params);
            }
        }
    }

    #[test]
    fn test_study_path() {
        let config = SearchConfig::new().with_strategy(SamplerType::Tpe);
        assert_eq!(config.study_path("digits"), PathBuf::from("output/tpe_search_digits.json"));
    }
}
