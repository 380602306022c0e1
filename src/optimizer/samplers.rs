//! Sampling strategies for hyperparameter optimization
//!
//! History entries are `(params, loss)` pairs; lower loss is better.

use super::search_space::{HyperParamDist, ParamSet, ParamValue, SearchSpace};
use crate::error::{KolosalError, Result};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerType {
    /// Independent uniform draws
    Random,
    /// Tree-structured Parzen Estimator
    Tpe,
}

impl SamplerType {
    pub fn name(&self) -> &'static str {
        match self {
            SamplerType::Random => "random",
            SamplerType::Tpe => "tpe",
        }
    }
}

impl std::str::FromStr for SamplerType {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(SamplerType::Random),
            "tpe" | "smart" => Ok(SamplerType::Tpe),
            other => Err(KolosalError::ConfigError(format!("Unknown search strategy: {}", other))),
        }
    }
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send + Sync {
    /// Sample the next set of hyperparameters
    fn sample(&mut self, search_space: &SearchSpace, history: &[(ParamSet, f64)]) -> ParamSet;
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(ParamSet, f64)]) -> ParamSet {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler
///
/// After `n_startup_trials` random trials, the history is split at the
/// `gamma` quantile of the loss into good and bad trials. Each parameter is
/// modelled independently by two Parzen densities, l(x) over the good values
/// and g(x) over the bad ones; `n_candidates` draws from l(x) are ranked by
/// l(x) / g(x) and the best one is kept.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TPESampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    fn sample_numeric(&mut self, low: f64, high: f64, good: &[f64], bad: &[f64]) -> f64 {
        let below = Parzen::fit(good, low, high);
        let above = Parzen::fit(bad, low, high);
        let mut best = (f64::NEG_INFINITY, below.draw(&mut self.rng));
        for _ in 0..self.n_candidates {
            let x = below.draw(&mut self.rng);
            let score = below.log_pdf(x) - above.log_pdf(x);
            if score > best.0 {
                best = (score, x);
            }
        }
        best.1
    }

    fn sample_choice(&mut self, values: &[ParamValue], good: &[&ParamValue], bad: &[&ParamValue]) -> ParamValue {
        // Counts with one pseudo-observation per option
        let weights = |obs: &[&ParamValue]| -> Vec<f64> {
            values
                .iter()
                .map(|v| 1.0 + obs.iter().filter(|o| **o == v).count() as f64)
                .collect()
        };
        let l = weights(good);
        let g = weights(bad);
        let (l_sum, g_sum): (f64, f64) = (l.iter().sum(), g.iter().sum());

        let mut best = (f64::NEG_INFINITY, 0);
        for _ in 0..self.n_candidates {
            let k = draw_weighted(&l, l_sum, &mut self.rng);
            let score = (l[k] / l_sum).ln() - (g[k] / g_sum).ln();
            if score > best.0 {
                best = (score, k);
            }
        }
        values[best.1].clone()
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(ParamSet, f64)]) -> ParamSet {
        // Use random sampling for startup trials
        if history.len() < self.n_startup_trials.max(2) {
            return search_space.sample(&mut self.rng);
        }

        let mut sorted: Vec<&(ParamSet, f64)> = history.iter().collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len() - 1);
        let (good, bad) = sorted.split_at(n_good);

        let mut params = ParamSet::new();
        for (name, dist) in search_space.iter() {
            let observed = |trials: &[&(ParamSet, f64)]| -> Vec<ParamValue> {
                trials
                    .iter()
                    .filter_map(|(p, _)| p.get(name))
                    .filter(|v| dist.contains(v))
                    .cloned()
                    .collect()
            };
            let (good_vals, bad_vals) = (observed(good), observed(bad));

            let value = match dist {
                HyperParamDist::IntRange { min, max } => {
                    let to_f = |vs: &[ParamValue]| vs.iter().filter_map(|v| v.as_float()).collect::<Vec<_>>();
                    let x = self.sample_numeric(*min as f64, *max as f64, &to_f(&good_vals), &to_f(&bad_vals));
                    ParamValue::Int((x.floor() as i64).clamp(*min, *max - 1))
                }
                HyperParamDist::FloatRange { min, max } => {
                    let to_f = |vs: &[ParamValue]| vs.iter().filter_map(|v| v.as_float()).collect::<Vec<_>>();
                    let x = self.sample_numeric(*min, *max, &to_f(&good_vals), &to_f(&bad_vals));
                    ParamValue::Float(x)
                }
                HyperParamDist::Choice { values } => {
                    let good_refs: Vec<&ParamValue> = good_vals.iter().collect();
                    let bad_refs: Vec<&ParamValue> = bad_vals.iter().collect();
                    self.sample_choice(values, &good_refs, &bad_refs)
                }
            };
            params.insert(name.clone(), value);
        }

        params
    }
}

/// Standard normal draw (Box-Muller)
fn normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn draw_weighted<R: Rng + ?Sized>(weights: &[f64], total: f64, rng: &mut R) -> usize {
    let mut u = rng.gen_range(0.0..total);
    for (k, &w) in weights.iter().enumerate() {
        if u < w {
            return k;
        }
        u -= w;
    }
    weights.len() - 1
}

/// Truncated Gaussian mixture over `[low, high)`: one component per
/// observation plus a wide prior component centred on the range.
#[derive(Debug)]
struct Parzen {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    low: f64,
    high: f64,
}

impl Parzen {
    fn fit(observations: &[f64], low: f64, high: f64) -> Self {
        let width = high - low;
        let prior_mu = low + width / 2.0;

        let mut mus: Vec<f64> = observations.to_vec();
        mus.push(prior_mu);
        mus.sort_by(f64::total_cmp);

        // Bandwidth: distance to the farther neighbour, bounded by the range
        let min_sigma = width / (100.0f64).min(1.0 + mus.len() as f64);
        let sigmas = (0..mus.len())
            .map(|i| {
                if mus[i] == prior_mu && observations.is_empty() {
                    return width;
                }
                let left = if i > 0 { mus[i] - mus[i - 1] } else { mus[i] - low };
                let right = if i + 1 < mus.len() { mus[i + 1] - mus[i] } else { high - mus[i] };
                left.max(right).clamp(min_sigma, width)
            })
            .collect();

        Self { mus, sigmas, low, high }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let k = rng.gen_range(0..self.mus.len());
        for _ in 0..32 {
            let x = self.mus[k] + self.sigmas[k] * normal(rng);
            if x >= self.low && x < self.high {
                return x;
            }
        }
        rng.gen_range(self.low..self.high)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let n = self.mus.len() as f64;
        let density: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .map(|(mu, sigma)| {
                let z = (x - mu) / sigma;
                (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
            })
            .sum();
        (density / n).max(f64::MIN_POSITIVE).ln()
    }
}

/// Create a sampler from type
pub fn create_sampler(sampler_type: SamplerType, seed: u64, n_startup_trials: usize) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::Tpe => Box::new(TPESampler::new(seed).with_n_startup(n_startup_trials)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> SearchSpace {
        SearchSpace::new()
            .float("lr", 0.001, 0.1)
            .int("depth", 2, 11)
            .choice("bootstrap", vec![ParamValue::Bool(true), ParamValue::Bool(false)])
    }

    #[test]
    fn test_random_sampler() {
        let mut sampler = RandomSampler::new(42);
        let params = sampler.sample(&space(), &[]);
        assert_eq!(params.len(), 3);
        for (name, dist) in space().iter() {
            assert!(dist.contains(&params[name]));
        }
    }

    #[test]
    fn test_samplers_are_seeded() {
        let mut a = RandomSampler::new(7);
        let mut b = RandomSampler::new(7);
        assert_eq!(a.sample(&space(), &[]), b.sample(&space(), &[]));
    }

    #[test]
    fn test_tpe_startup_is_random_and_in_range() {
        let mut sampler = TPESampler::new(42);
        for _ in 0..5 {
            let params = sampler.sample(&space(), &[]);
            assert!(space().get("lr").unwrap().contains(&params["lr"]));
        }
    }

    #[test]
    fn test_tpe_concentrates_near_good_trials() {
        let space = SearchSpace::new().float("x", 0.0, 10.0);
        // Loss is the distance to 2.0
        let history: Vec<(ParamSet, f64)> = (0..40)
            .map(|i| {
                let x = i as f64 * 0.25;
                let mut params = ParamSet::new();
                params.insert("x".to_string(), ParamValue::Float(x));
                (params, (x - 2.0).abs())
            })
            .collect();

        let mut sampler = TPESampler::new(1).with_n_startup(5);
        let draws: Vec<f64> = (0..50)
            .map(|_| sampler.sample(&space, &history)["x"].as_float().unwrap())
            .collect();
        assert!(draws.iter().all(|x| (0.0..10.0).contains(x)));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 2.0).abs() < 1.5, "mean of TPE draws was {}", mean);
    }

    #[test]
    fn test_tpe_prefers_good_choice() {
        let space = SearchSpace::new().choice("c", vec![ParamValue::Str("a".into()), ParamValue::Str("b".into())]);
        let history: Vec<(ParamSet, f64)> = (0..20)
            .map(|i| {
                let v = if i % 2 == 0 { "a" } else { "b" };
                let mut params = ParamSet::new();
                params.insert("c".to_string(), ParamValue::Str(v.into()));
                (params, if v == "a" { 0.1 } else { 1.0 })
            })
            .collect();
        let mut sampler = TPESampler::new(3).with_n_startup(2);
        let n_a = (0..20)
            .filter(|_| sampler.sample(&space, &history)["c"] == ParamValue::Str("a".into()))
            .count();
        assert!(n_a >= 18);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("tpe".parse::<SamplerType>().unwrap(), SamplerType::Tpe);
        assert_eq!("random".parse::<SamplerType>().unwrap(), SamplerType::Random);
        assert!("grid".parse::<SamplerType>().is_err());
    }
}
