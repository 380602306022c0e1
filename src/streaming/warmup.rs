//! Warm-up fit on a prefix of the stream
//!
//! The first `init_size` rows are read as one block, split into train and
//! validation parts, and used for a multi-epoch fit. Validation metrics are
//! reported; the caller restarts the source afterwards so the online pass
//! sees every row.

use super::config::WarmupConfig;
use crate::error::{KolosalError, Result};
use crate::feature_engineering::FeatureHasher;
use crate::training::{accuracy, f1_score, log_loss, train_test_split, ClassificationMetrics, Estimator, IncrementalClassifier};
use crate::utils::CsvChunkSource;
use std::collections::HashMap;
use std::io::Read;
use tracing::info;

/// Fit `estimator` on the stream prefix and score it on the held-out part
pub fn warm_up<R: Read>(
    source: &mut CsvChunkSource<R>,
    hasher: &FeatureHasher,
    estimator: &mut Estimator,
    config: &WarmupConfig,
) -> Result<ClassificationMetrics> {
    let batch = source
        .next_batch_of(config.init_size)?
        .ok_or_else(|| KolosalError::DataError("no rows available for the warm-up fit".to_string()))?;
    let encoded = hasher.encode(&batch)?;
    if encoded.len() < 2 {
        return Err(KolosalError::DataError(format!(
            "warm-up needs at least 2 rows, got {}",
            encoded.len()
        )));
    }

    let (train_idx, valid_idx) = train_test_split(encoded.len(), config.test_size, config.seed)?;
    if train_idx.is_empty() {
        return Err(KolosalError::DataError("warm-up split left no training rows".to_string()));
    }

    let x_train = encoded.features.select_rows(&train_idx);
    let y_train: Vec<String> = train_idx.iter().map(|&i| encoded.labels[i].clone()).collect();
    let x_valid = encoded.features.select_rows(&valid_idx);
    let y_valid: Vec<String> = valid_idx.iter().map(|&i| encoded.labels[i].clone()).collect();

    let epochs = estimator.fit(&x_train, &y_train)?;

    let predicted = estimator.predict(&x_valid)?;
    let proba = estimator.predict_proba(&x_valid)?;
    let classes = estimator.classes();
    let y_index = y_valid
        .iter()
        .map(|label| {
            classes.iter().position(|c| c == label).ok_or_else(|| {
                KolosalError::ComputationError(format!("label '{}' is not in the class set {:?}", label, classes))
            })
        })
        .collect::<Result<Vec<usize>>>()?;

    let positive = classes
        .last()
        .ok_or_else(|| KolosalError::ConfigError("empty class set".to_string()))?;

    let metrics = ClassificationMetrics {
        baseline: majority_share(&encoded.labels),
        accuracy: accuracy(&y_valid, &predicted),
        f1_score: f1_score(&y_valid, &predicted, positive),
        log_loss: log_loss(&y_index, proba.view())?,
        n_samples: y_valid.len(),
    };

    info!(
        rows = encoded.len(),
        train = train_idx.len(),
        valid = valid_idx.len(),
        epochs,
        baseline = metrics.baseline,
        accuracy = metrics.accuracy,
        f1 = metrics.f1_score,
        log_loss = metrics.log_loss,
        "warm-up fit finished"
    );
    Ok(metrics)
}

fn majority_share(labels: &[String]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    top as f64 / labels.len() as f64
}
