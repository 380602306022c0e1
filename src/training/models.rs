//! Batch classifier trait and the model families used by the search

use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::random_forest::{MaxFeatures, RandomForestClassifier};
use crate::error::{KolosalError, Result};
use crate::optimizer::{ParamSet, ParamValue};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A classifier trained on a dense numeric table with class indices `0..n_classes`
pub trait Classifier: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<()>;

    /// One probability per class per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Model family searched over, selected once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "rf")]
    RandomForest,
    #[serde(rename = "gb")]
    GradientBoosting,
}

impl std::str::FromStr for ModelFamily {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rf" | "random_forest" => Ok(ModelFamily::RandomForest),
            "gb" | "gradient_boosting" => Ok(ModelFamily::GradientBoosting),
            other => Err(KolosalError::ConfigError(format!("Unknown model family: {}", other))),
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::RandomForest => write!(f, "rf"),
            ModelFamily::GradientBoosting => write!(f, "gb"),
        }
    }
}

fn invalid(name: &str, value: &ParamValue, reason: &str) -> KolosalError {
    KolosalError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn as_count(name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_int() {
        Some(n) if n >= 1 => Ok(n as usize),
        _ => Err(invalid(name, value, "expected a positive integer")),
    }
}

fn as_seed(name: &str, value: &ParamValue) -> Result<u64> {
    match value.as_int() {
        Some(n) if n >= 0 => Ok(n as u64),
        _ => Err(invalid(name, value, "expected a non-negative integer")),
    }
}

fn as_rate(name: &str, value: &ParamValue) -> Result<f64> {
    value.as_float().ok_or_else(|| invalid(name, value, "expected a number"))
}

fn as_max_features(name: &str, value: &ParamValue) -> Result<MaxFeatures> {
    match value {
        ParamValue::Str(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
        ParamValue::Str(s) if s == "log2" => Ok(MaxFeatures::Log2),
        ParamValue::Int(n) if *n >= 1 => Ok(MaxFeatures::Fixed(*n as usize)),
        ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
        _ => Err(invalid(name, value, "expected sqrt, log2, a count or a fraction in (0, 1]")),
    }
}

impl ModelFamily {
    /// Parameters every trial starts from before sampled values are layered on
    pub fn default_params(&self, n_trees: usize, seed: u64) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("n_estimators".to_string(), ParamValue::Int(n_trees as i64));
        params.insert("random_state".to_string(), ParamValue::Int(seed as i64));
        params
    }

    /// Build an untrained model. Unknown or ill-typed parameters are rejected.
    pub fn build(&self, params: &ParamSet) -> Result<Box<dyn Classifier>> {
        match self {
            ModelFamily::RandomForest => {
                let mut model = RandomForestClassifier::default();
                for (name, value) in params {
                    match name.as_str() {
                        "n_estimators" => model.n_estimators = as_count(name, value)?,
                        "max_depth" => model.max_depth = Some(as_count(name, value)?),
                        "min_samples_split" => model.min_samples_split = as_count(name, value)?.max(2),
                        "min_samples_leaf" => model.min_samples_leaf = as_count(name, value)?,
                        "max_features" => model.max_features = as_max_features(name, value)?,
                        "bootstrap" => {
                            model.bootstrap = value
                                .as_bool()
                                .ok_or_else(|| invalid(name, value, "expected a boolean"))?
                        }
                        "random_state" => model.random_state = as_seed(name, value)?,
                        _ => return Err(invalid(name, value, "not a random forest parameter")),
                    }
                }
                Ok(Box::new(model))
            }
            ModelFamily::GradientBoosting => {
                let mut config = GradientBoostingConfig::default();
                for (name, value) in params {
                    match name.as_str() {
                        "n_estimators" => config.n_estimators = as_count(name, value)?,
                        "max_depth" => config.max_depth = as_count(name, value)?,
                        "min_samples_leaf" => config.min_samples_leaf = as_count(name, value)?,
                        "learning_rate" => config.learning_rate = as_rate(name, value)?,
                        "subsample" => config.subsample = as_rate(name, value)?,
                        "max_features" => config.max_features = as_max_features(name, value)?,
                        "random_state" => config.random_state = as_seed(name, value)?,
                        _ => return Err(invalid(name, value, "not a gradient boosting parameter")),
                    }
                }
                config.validate()?;
                Ok(Box::new(GradientBoostingClassifier::new(config)))
            }
        }
    }
}
