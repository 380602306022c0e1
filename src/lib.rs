//! Kolosal Online - online learning over chunked tabular streams
//!
//! A chunked CSV stream is hashed into sparse features and fed to an
//! incremental classifier. Every batch is scored before the model learns
//! from it, and the log-loss over each window of K batches forms the
//! run's loss series.
//!
//! # Modules
//!
//! - [`utils`] - chunked CSV sources and dense table loading
//! - [`feature_engineering`] - feature hashing into sparse matrices
//! - [`training`] - incremental SGD, tree ensembles, cross-validation, metrics
//! - [`streaming`] - windowed evaluation and the online driver loop
//! - [`optimizer`] - random and TPE hyper-parameter search
//! - [`cli`] - command-line interface

// Core error handling
pub mod error;

// Data and models
pub mod utils;
pub mod feature_engineering;
pub mod training;

// Online learning
pub mod streaming;

// Hyper-parameter search
pub mod optimizer;

// Services
pub mod cli;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result};

    // Data
    pub use crate::utils::{Batch, BatchSource, CsvChunkSource, CsvSourceOptions, LabeledTable};

    // Features
    pub use crate::feature_engineering::{EncodedBatch, FeatureHasher, SparseMatrix};

    // Training
    pub use crate::training::{
        Classifier, Estimator, EstimatorKind, IncrementalClassifier, ModelFamily, SGDClassifier, SGDConfig, Scoring,
    };

    // Streaming
    pub use crate::streaming::{
        run_from_config, Driver, LossPoint, LossReporter, RunState, RunSummary, StopReason, StreamConfig,
        WindowedEvaluator,
    };

    // Optimization
    pub use crate::optimizer::{SamplerType, SearchConfig, SearchRunner, SearchSpace, Study};
}
