//! Configuration for an online-learning run

use crate::error::{KolosalError, Result};
use crate::feature_engineering::{FeatureHasher, DEFAULT_N_FEATURES};
use crate::training::EstimatorKind;
use crate::utils::CsvSourceOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Warm-up fit on a prefix of the stream before the online pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Rows read for the warm-up fit
    pub init_size: usize,
    /// Share of the prefix held out for validation
    pub test_size: f64,
    /// Seed of the train/validation shuffle
    pub seed: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self { init_size: 100_000, test_size: 0.2, seed: 42 }
    }
}

/// Configuration for streaming training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Rows per batch
    pub chunk_size: usize,
    /// Batches per loss report (K)
    pub window_size: usize,
    /// Hash width
    pub n_features: usize,
    pub alternate_sign: bool,
    /// Hash `column=value` instead of the bare value
    pub column_prefix: bool,
    /// Run to exhaustion instead of stopping at `max_batches`
    pub full_run: bool,
    /// Run-length cap when `full_run` is off; defaults to 2 * window_size
    pub max_batches: Option<u64>,
    pub label_column: String,
    pub drop_columns: Vec<String>,
    /// Column names to use instead of the file header
    pub column_names: Option<Vec<String>>,
    pub delimiter: char,
    /// Class set the estimator is initialized with
    pub classes: Vec<String>,
    pub estimator: EstimatorKind,
    /// `None` skips the warm-up fit
    pub warmup: Option<WarmupConfig>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            window_size: 100,
            n_features: DEFAULT_N_FEATURES,
            alternate_sign: true,
            column_prefix: false,
            full_run: false,
            max_batches: None,
            label_column: "click".to_string(),
            drop_columns: vec!["id".to_string()],
            column_names: None,
            delimiter: ',',
            classes: vec!["0".to_string(), "1".to_string()],
            estimator: EstimatorKind::default(),
            warmup: Some(WarmupConfig::default()),
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: StreamConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_window_size(mut self, k: usize) -> Self {
        self.window_size = k;
        self
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_full_run(mut self, full_run: bool) -> Self {
        self.full_run = full_run;
        self
    }

    pub fn with_max_batches(mut self, n: u64) -> Self {
        self.max_batches = Some(n);
        self
    }

    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_estimator(mut self, estimator: EstimatorKind) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_warmup(mut self, warmup: Option<WarmupConfig>) -> Self {
        self.warmup = warmup;
        self
    }

    /// Batch cap in effect, `None` for a full run
    pub fn batch_cap(&self) -> Option<u64> {
        if self.full_run {
            None
        } else {
            Some(self.max_batches.unwrap_or(2 * self.window_size as u64))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(KolosalError::ConfigError("chunk_size must be at least 1".to_string()));
        }
        if self.window_size == 0 {
            return Err(KolosalError::ConfigError("window_size must be at least 1".to_string()));
        }
        if self.n_features == 0 {
            return Err(KolosalError::ConfigError("n_features must be at least 1".to_string()));
        }
        if self.batch_cap() == Some(0) {
            return Err(KolosalError::ConfigError("max_batches must be at least 1".to_string()));
        }
        if !self.delimiter.is_ascii() {
            return Err(KolosalError::ConfigError(format!(
                "delimiter must be a single ASCII character, got {:?}", self.delimiter
            )));
        }
        if let Some(warmup) = &self.warmup {
            if warmup.init_size < 2 {
                return Err(KolosalError::ConfigError("warmup.init_size must be at least 2".to_string()));
            }
            if !(warmup.test_size > 0.0 && warmup.test_size < 1.0) {
                return Err(KolosalError::ConfigError("warmup.test_size must be in (0, 1)".to_string()));
            }
        }
        Ok(())
    }

    pub fn source_options(&self) -> CsvSourceOptions {
        CsvSourceOptions {
            chunk_size: self.chunk_size,
            delimiter: self.delimiter as u8,
            column_names: self.column_names.clone(),
            label_column: self.label_column.clone(),
            drop_columns: self.drop_columns.clone(),
        }
    }

    pub fn hasher(&self) -> Result<FeatureHasher> {
        Ok(FeatureHasher::new(self.n_features)?
            .with_alternate_sign(self.alternate_sign)
            .with_column_prefix(self.column_prefix))
    }
}
