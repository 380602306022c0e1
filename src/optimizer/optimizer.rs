//! Search runner and study persistence

use super::config::SearchConfig;
use super::samplers::{create_sampler, SamplerType};
use super::search_space::ParamSet;
use crate::error::{KolosalError, Result};
use crate::training::{cross_val_score, CrossValidator, ModelFamily, Scoring};
use crate::utils::LabeledTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Result of a single trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    /// Full parameter set the model was built from (defaults plus sampled values)
    pub params: ParamSet,
    pub mean_score: f64,
    pub std_score: f64,
    pub fold_scores: Vec<f64>,
    /// Minimized objective, `-mean_score`
    pub loss: f64,
    pub duration_secs: f64,
}

/// Study containing all trials of one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub dataset: String,
    pub strategy: SamplerType,
    pub family: ModelFamily,
    pub scoring: Scoring,
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_duration_secs: f64,
}

impl Study {
    pub fn new(dataset: impl Into<String>, strategy: SamplerType, family: ModelFamily, scoring: Scoring) -> Self {
        Self {
            dataset: dataset.into(),
            strategy,
            family,
            scoring,
            trials: Vec::new(),
            best_trial_idx: None,
            started_at: Utc::now(),
            finished_at: None,
            total_duration_secs: 0.0,
        }
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_params(&self) -> Option<&ParamSet> {
        self.best_trial().map(|t| &t.params)
    }

    /// Trial losses in trial order
    pub fn losses(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.loss).collect()
    }

    /// Add a trial result; ties keep the earlier trial as best
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();
        let is_better = match self.best_trial() {
            None => true,
            Some(best) => result.loss < best.loss,
        };
        if is_better {
            self.best_trial_idx = Some(idx);
        }
        self.trials.push(result);
    }

    /// Up to `n` trials ordered by mean score, best first
    pub fn top_trials(&self, n: usize) -> Vec<&TrialResult> {
        let mut ranked: Vec<&TrialResult> = self.trials.iter().collect();
        ranked.sort_by(|a, b| a.loss.total_cmp(&b.loss).then(a.trial_id.cmp(&b.trial_id)));
        ranked.truncate(n);
        ranked
    }

    /// Plain-text ranking of the best `n` trials
    pub fn report(&self, n: usize) -> String {
        let mut out = String::new();
        for (rank, trial) in self.top_trials(n).into_iter().enumerate() {
            let params: Vec<String> = trial.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            let _ = writeln!(out, "Model with rank: {}", rank + 1);
            let _ = writeln!(
                out,
                "Mean validation score: {:.3} (std: {:.3})",
                trial.mean_score, trial.std_score
            );
            let _ = writeln!(out, "Parameters: {{{}}}", params.join(", "));
            let _ = writeln!(out);
        }
        out
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Study> {
        let json = std::fs::read_to_string(path)?;
        let study: Study = serde_json::from_str(&json)?;
        Ok(study)
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Runs a randomized or TPE search over one model family
pub struct SearchRunner {
    config: SearchConfig,
}

impl SearchRunner {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run `evals` trials sequentially; folds of each trial are scored in
    /// parallel. The first failing trial aborts the search.
    pub fn run(&self, table: &LabeledTable) -> Result<Study> {
        let config = &self.config;
        let start = Instant::now();
        let mut study = Study::new(&table.name, config.strategy, config.family, config.scoring);

        let splits = CrossValidator::stratified(config.folds).split(&table.y)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_jobs)
            .build()
            .map_err(|e| KolosalError::OptimizationError(format!("thread pool: {}", e)))?;
        let mut sampler = create_sampler(config.strategy, config.seed, config.n_startup_trials);
        let defaults = config.family.default_params(config.n_trees, config.seed);
        let mut history: Vec<(ParamSet, f64)> = Vec::with_capacity(config.evals);

        info!(
            dataset = %table.name,
            rows = table.n_samples(),
            classes = table.n_classes(),
            strategy = config.strategy.name(),
            family = %config.family,
            evals = config.evals,
            folds = config.folds,
            "starting search"
        );

        for trial_id in 0..config.evals {
            let trial_start = Instant::now();
            let mut params = defaults.clone();
            params.extend(sampler.sample(&config.hp_dist, &history));

            let fold_scores = pool
                .install(|| {
                    cross_val_score(
                        config.family,
                        &params,
                        &table.x,
                        &table.y,
                        table.n_classes(),
                        &splits,
                        config.scoring,
                    )
                })
                .map_err(|e| KolosalError::OptimizationError(format!("trial {} failed: {}", trial_id, e)))?;

            let (mean_score, std_score) = mean_std(&fold_scores);
            let loss = -mean_score;
            info!(trial_id, loss, mean_score, std_score, "trial finished");

            history.push((params.clone(), loss));
            study.add_trial(TrialResult {
                trial_id,
                params,
                mean_score,
                std_score,
                fold_scores,
                loss,
                duration_secs: trial_start.elapsed().as_secs_f64(),
            });
        }

        study.finished_at = Some(Utc::now());
        study.total_duration_secs = start.elapsed().as_secs_f64();
        if let Some(best) = study.best_trial() {
            info!(trial_id = best.trial_id, loss = best.loss, "search finished");
        }
        Ok(study)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(trial_id: usize, loss: f64) -> TrialResult {
        TrialResult {
            trial_id,
            params: ParamSet::new(),
            mean_score: -loss,
            std_score: 0.0,
            fold_scores: vec![-loss],
            loss,
            duration_secs: 0.0,
        }
    }

    #[test]
    fn test_best_trial_tracking() {
        let mut study = Study::new("t", SamplerType::Random, ModelFamily::RandomForest, Scoring::NegLogLoss);
        assert!(study.best_trial().is_none());
        study.add_trial(trial(0, 0.5));
        study.add_trial(trial(1, 0.3));
        study.add_trial(trial(2, 0.3));
        study.add_trial(trial(3, 0.9));
        assert_eq!(study.best_trial().unwrap().trial_id, 1);
        assert_eq!(study.losses(), vec![0.5, 0.3, 0.3, 0.9]);

        let top: Vec<usize> = study.top_trials(3).iter().map(|t| t.trial_id).collect();
        assert_eq!(top, vec![1, 2, 0]);
    }

    #[test]
    fn test_report_lists_ranks() {
        let mut study = Study::new("t", SamplerType::Tpe, ModelFamily::GradientBoosting, Scoring::Accuracy);
        study.add_trial(trial(0, -0.8));
        study.add_trial(trial(1, -0.9));
        let report = study.report(3);
        assert!(report.contains("Model with rank: 1"));
        assert!(report.contains("Model with rank: 2"));
        assert!(!report.contains("Model with rank: 3"));
        assert!(report.find("0.900").unwrap() < report.find("0.800").unwrap());
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[1.0, 3.0]);
        assert_eq!(mean, 2.0);
        assert_eq!(std, 1.0);
    }
}
