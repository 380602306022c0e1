//! Hyperparameter search
//!
//! - typed search spaces (`int`, `float`, `choice`) loaded from JSON
//! - random search and Tree-structured Parzen Estimator (TPE) sampling
//! - cross-validated trial scoring and a persisted [`Study`]

mod config;
#[allow(clippy::module_inception)]
mod optimizer;
mod samplers;
mod search_space;

pub use config::SearchConfig;
pub use optimizer::{SearchRunner, Study, TrialResult};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{HyperParamDist, ParamSet, ParamValue, SearchSpace};
