//! Search space definition for hyperparameter optimization
//!
//! Distributions deserialize from the JSON shape used by the search configs:
//!
//! ```json
//! {
//!   "max_depth":    { "type": "int",    "min": 2,   "max": 11 },
//!   "max_features": { "type": "float",  "min": 0.1, "max": 1.0 },
//!   "bootstrap":    { "type": "choice", "values": [true, false] }
//! }
//! ```

use crate::error::{KolosalError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A concrete hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Integer view; floats with no fractional part are accepted
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(v) => Some(v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            ParamValue::Float(v) => Some(v),
            ParamValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Parameters of one trial, ordered by name
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Distribution of one hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HyperParamDist {
    /// Integers in `[min, max)`
    #[serde(rename = "int")]
    IntRange { min: i64, max: i64 },
    /// Reals in `[min, max)`
    #[serde(rename = "float")]
    FloatRange { min: f64, max: f64 },
    #[serde(rename = "choice")]
    Choice { values: Vec<ParamValue> },
}

impl HyperParamDist {
    pub fn validate(&self, name: &str) -> Result<()> {
        let ok = match self {
            HyperParamDist::IntRange { min, max } => min < max,
            HyperParamDist::FloatRange { min, max } => min < max && min.is_finite() && max.is_finite(),
            HyperParamDist::Choice { values } => !values.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(KolosalError::ConfigError(format!(
                "Empty distribution for '{}': {:?}", name, self
            )))
        }
    }

    /// Uniform draw
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            HyperParamDist::IntRange { min, max } => ParamValue::Int(rng.gen_range(*min..*max)),
            HyperParamDist::FloatRange { min, max } => ParamValue::Float(rng.gen_range(*min..*max)),
            HyperParamDist::Choice { values } => values[rng.gen_range(0..values.len())].clone(),
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match self {
            HyperParamDist::IntRange { min, max } => {
                matches!(value, ParamValue::Int(v) if v >= min && v < max)
            }
            HyperParamDist::FloatRange { min, max } => {
                matches!(value, ParamValue::Float(v) if v >= min && v < max)
            }
            HyperParamDist::Choice { values } => values.contains(value),
        }
    }
}

/// Named hyperparameter distributions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    params: BTreeMap<String, HyperParamDist>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON map form
    pub fn from_json(json: &str) -> Result<Self> {
        let space: SearchSpace = serde_json::from_str(json)?;
        space.validate()?;
        Ok(space)
    }

    pub fn int(mut self, name: &str, min: i64, max: i64) -> Self {
        self.params.insert(name.to_string(), HyperParamDist::IntRange { min, max });
        self
    }

    pub fn float(mut self, name: &str, min: f64, max: f64) -> Self {
        self.params.insert(name.to_string(), HyperParamDist::FloatRange { min, max });
        self
    }

    pub fn choice(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.params.insert(name.to_string(), HyperParamDist::Choice { values });
        self
    }

    pub fn get(&self, name: &str) -> Option<&HyperParamDist> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HyperParamDist)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        self.params.iter().try_for_each(|(name, dist)| dist.validate(name))
    }

    /// Independent uniform draw of every parameter
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamSet {
        self.params
            .iter()
            .map(|(name, dist)| (name.clone(), dist.sample(rng)))
            .collect()
    }
}
