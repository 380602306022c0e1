//! Integration tests for hyper-parameter search: trial counts, best-trial tracking,
//! reproducibility and study persistence

use kolosal_online::error::KolosalError;
use kolosal_online::optimizer::{ParamValue, SamplerType, SearchConfig, SearchRunner, SearchSpace, Study};
use kolosal_online::training::{ModelFamily, Scoring};
use kolosal_online::utils::LabeledTable;
use ndarray::Array2;

// ============================================================================
// Helpers
// ============================================================================

/// Two informative features and one noise feature, three interleaved classes
fn blobs(n_per_class: usize) -> LabeledTable {
    let n = n_per_class * 3;
    let mut x = Array2::zeros((n, 3));
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % 3;
        let jitter = ((i * 37) % 11) as f64 / 11.0 - 0.5;
        x[[i, 0]] = class as f64 * 2.0 + jitter;
        x[[i, 1]] = (2 - class) as f64 * 1.5 - jitter;
        x[[i, 2]] = ((i * 13) % 7) as f64;
        labels.push(format!("c{}", class));
    }
    let names = vec!["f0".to_string(), "f1".to_string(), "noise".to_string()];
    LabeledTable::from_labels("blobs", names, x, &labels).unwrap()
}

fn small_config(strategy: SamplerType) -> SearchConfig {
    SearchConfig::new()
        .with_strategy(strategy)
        .with_evals(5)
        .with_folds(3)
        .with_n_trees(4)
        .with_n_jobs(2)
        .with_seed(11)
}

// ============================================================================
// Search runs
// ============================================================================

#[test]
fn test_random_search_runs_every_trial() {
    let table = blobs(20);
    let config = small_config(SamplerType::Random);
    let space = config.hp_dist.clone();
    let study = SearchRunner::new(config).unwrap().run(&table).unwrap();

    assert_eq!(study.trials.len(), 5);
    assert_eq!(study.dataset, "blobs");
    assert!(study.finished_at.is_some());
    for (i, trial) in study.trials.iter().enumerate() {
        assert_eq!(trial.trial_id, i);
        assert_eq!(trial.fold_scores.len(), 3);
        assert!((trial.loss + trial.mean_score).abs() < 1e-12);
        for (name, dist) in space.iter() {
            assert!(dist.contains(&trial.params[name]), "{} = {} outside {:?}", name, trial.params[name], dist);
        }
        assert_eq!(trial.params["n_estimators"], ParamValue::Int(4));
    }

    let best = study.best_trial().unwrap();
    let min_loss = study.losses().into_iter().fold(f64::INFINITY, f64::min);
    assert_eq!(best.loss, min_loss);
    assert_eq!(study.best_params(), Some(&best.params));
}

#[test]
fn test_tpe_search_after_startup() {
    let table = blobs(15);
    let config = SearchConfig {
        n_startup_trials: 2,
        family: ModelFamily::GradientBoosting,
        hp_dist: SearchConfig::default_space(ModelFamily::GradientBoosting),
        scoring: Scoring::Accuracy,
        ..small_config(SamplerType::Tpe)
    }
    .with_evals(6);

    let study = SearchRunner::new(config.clone()).unwrap().run(&table).unwrap();
    assert_eq!(study.trials.len(), 6);
    assert_eq!(study.strategy, SamplerType::Tpe);
    for trial in &study.trials {
        assert!((0.0..=1.0).contains(&trial.mean_score));
        for (name, dist) in config.hp_dist.iter() {
            assert!(dist.contains(&trial.params[name]));
        }
    }
}

#[test]
fn test_search_is_reproducible() {
    let table = blobs(12);
    for strategy in [SamplerType::Random, SamplerType::Tpe] {
        let config = SearchConfig { n_startup_trials: 2, ..small_config(strategy) };
        let a = SearchRunner::new(config.clone()).unwrap().run(&table).unwrap();
        let b = SearchRunner::new(config).unwrap().run(&table).unwrap();

        let params_a: Vec<_> = a.trials.iter().map(|t| t.params.clone()).collect();
        let params_b: Vec<_> = b.trials.iter().map(|t| t.params.clone()).collect();
        assert_eq!(params_a, params_b);
        assert_eq!(a.losses(), b.losses());
        assert_eq!(a.best_trial_idx, b.best_trial_idx);
    }
}

#[test]
fn test_failing_trial_aborts_search() {
    let table = blobs(10);
    let config = small_config(SamplerType::Random)
        .with_hp_dist(SearchSpace::new().choice("learning_rate", vec![ParamValue::Float(0.1)]));

    let result = SearchRunner::new(config).unwrap().run(&table);
    match result {
        Err(KolosalError::OptimizationError(msg)) => assert!(msg.contains("trial 0")),
        other => panic!("expected an optimization error, got {:?}", other),
    }
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_study_round_trips_through_json() {
    let table = blobs(10);
    let mut config = small_config(SamplerType::Random).with_evals(3);
    config.output_dir = std::env::temp_dir().join(format!("kolosal_online_study_{}", std::process::id()));
    let study = SearchRunner::new(config.clone()).unwrap().run(&table).unwrap();

    let path = config.study_path(&table.name);
    assert!(path.ends_with("random_search_blobs.json"));
    study.save(&path).unwrap();
    let loaded = Study::load(&path).unwrap();
    std::fs::remove_dir_all(&config.output_dir).ok();

    assert_eq!(loaded.trials.len(), study.trials.len());
    assert_eq!(loaded.best_trial_idx, study.best_trial_idx);
    assert_eq!(loaded.strategy, study.strategy);
    assert_eq!(loaded.family, study.family);
    assert_eq!(loaded.started_at, study.started_at);
    for (l, s) in loaded.trials.iter().zip(&study.trials) {
        assert_eq!(l.trial_id, s.trial_id);
        assert_eq!(l.params.keys().collect::<Vec<_>>(), s.params.keys().collect::<Vec<_>>());
        assert!((l.loss - s.loss).abs() < 1e-12);
    }
}

#[test]
fn test_report_lists_top_trials() {
    let table = blobs(10);
    let study = SearchRunner::new(small_config(SamplerType::Random)).unwrap().run(&table).unwrap();
    let report = study.report(3);
    assert_eq!(report.matches("Model with rank:").count(), 3);
    assert!(report.contains("Mean validation score:"));
    assert!(report.contains("Parameters: {"));
}

#[test]
fn test_notebook_search_space_json() {
    let space = SearchSpace::from_json(
        r#"{"max_depth": {"type": "int", "min": 2, "max": 11},
            "max_features": {"type": "float", "min": 0.1, "max": 1.0},
            "bootstrap": {"type": "choice", "values": [true, false]}}"#,
    )
    .unwrap();
    assert_eq!(space, SearchConfig::default_space(ModelFamily::RandomForest));
}
