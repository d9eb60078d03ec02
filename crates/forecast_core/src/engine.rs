//! Monte Carlo Engine — runs N independent BurnDown trials and aggregates.
//!
//! Trials are embarrassingly parallel. With the `parallel` feature (on by
//! default, matching the rest of this crate's `#[cfg(feature = "parallel")]`
//! convention) they're distributed across a rayon pool; each trial derives
//! its own seed from the run's root seed via a splitmix64 step, so the
//! result is bit-identical regardless of how rayon schedules the work.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::burndown::{run_trial, TrialCache, TrialOutcome};
use crate::config::{SimulationConfig, SimulationMode};
use crate::error::ForecastError;
use crate::model::result::SimulationResult;
use crate::sampler::Sampler;
use crate::util::percentiles::{histogram, mean_std, percentile_set};

/// Sink for coarse-grained progress updates from [`run_cancellable`]. The
/// Task Runner (`forecast_server::tasks`) implements this to write
/// `{progress, stage}` onto its `Task` record at coarse intervals — roughly
/// every 1% or every 50ms, whichever is longer.
pub trait ProgressSink {
    fn report(&self, percent: u8, stage: &str);
}

impl ProgressSink for () {
    fn report(&self, _percent: u8, _stage: &str) {}
}

/// Derive a per-trial seed from a root seed and trial index. Two calls with
/// the same `(root, index)` always produce the same seed, independent of
/// execution order — this is what makes parallel dispatch deterministic.
/// `pub(crate)` so `forecast::how_many` can seed its own per-trial loop the
/// same way, rather than mixing a weaker additive seed.
pub(crate) fn trial_seed(root: u64, index: u64) -> u64 {
    let mut z = root.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn run_one(config: &SimulationConfig, cache: &TrialCache, sampler: &Sampler, root_seed: u64, index: u64) -> TrialOutcome {
    let mut rng = SmallRng::seed_from_u64(trial_seed(root_seed, index));
    let mut sampler = sampler.clone();
    run_trial(config, cache, &mut sampler, &mut rng)
}

/// Run `config.n_simulations` trials and aggregate into a [`SimulationResult`].
///
/// Validates `config` first; any per-trial truncation (a trial
/// that hit `MAX_WEEKS`) is counted in `truncated_trials`, never dropped or
/// propagated as an error.
pub fn run(config: &SimulationConfig) -> Result<SimulationResult, ForecastError> {
    let outcomes = trials(config)?;
    Ok(aggregate(config, &outcomes))
}

/// Run `config.n_simulations` trials and return the raw, unaggregated
/// per-trial outcomes. The Portfolio Simulator needs these directly —
/// it pairs project `i`'s trial `k` with every other project's trial `k` to
/// preserve joint distribution across projects, which an aggregated
/// [`SimulationResult`] can't express.
pub fn trials(config: &SimulationConfig) -> Result<Vec<TrialOutcome>, ForecastError> {
    config.validate()?;

    let cache = TrialCache::build(config);
    let sampler = Sampler::fit(&config.tp_samples)?;
    let root_seed = config.seed.unwrap_or_else(|| rand::rng().random());

    let n = config.n_simulations;

    #[cfg(feature = "parallel")]
    let outcomes: Vec<TrialOutcome> = (0..n)
        .into_par_iter()
        .map(|i| run_one(config, &cache, &sampler, root_seed, i as u64))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<TrialOutcome> = (0..n)
        .map(|i| run_one(config, &cache, &sampler, root_seed, i as u64))
        .collect();

    Ok(outcomes)
}

/// Run trials in ~1%-sized batches, checking `cancel` between batches and
/// reporting progress to `progress`. Cancellation is cooperative: the
/// worker observes a boolean flag between trials, approximated here at
/// batch granularity so the check isn't on the hot per-trial path.
///
/// Returns [`ForecastError::Cancelled`] as soon as a batch boundary observes
/// `cancel` set; trials already completed in earlier batches are discarded
/// along with the partial result ("the result is discarded, not
/// persisted, on cancellation").
pub fn run_cancellable(
    config: &SimulationConfig,
    cancel: &AtomicBool,
    progress: &dyn ProgressSink,
) -> Result<SimulationResult, ForecastError> {
    config.validate()?;

    let cache = TrialCache::build(config);
    let sampler = Sampler::fit(&config.tp_samples)?;
    let root_seed = config.seed.unwrap_or_else(|| rand::rng().random());
    let n = config.n_simulations;
    let chunk_size = (n / 100).max(1);

    let mut outcomes = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        if cancel.load(Ordering::Relaxed) {
            return Err(ForecastError::Cancelled);
        }

        let end = (i + chunk_size).min(n);

        #[cfg(feature = "parallel")]
        let batch: Vec<TrialOutcome> = (i..end)
            .into_par_iter()
            .map(|k| run_one(config, &cache, &sampler, root_seed, k as u64))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let batch: Vec<TrialOutcome> = (i..end)
            .map(|k| run_one(config, &cache, &sampler, root_seed, k as u64))
            .collect();

        outcomes.extend(batch);
        i = end;
        progress.report(((i as f64 / n as f64) * 100.0).round() as u8, "simulating");
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(ForecastError::Cancelled);
    }

    Ok(aggregate(config, &outcomes))
}

fn aggregate(config: &SimulationConfig, outcomes: &[TrialOutcome]) -> SimulationResult {
    let mut weeks: Vec<f64> = outcomes.iter().map(|o| o.weeks as f64).collect();
    weeks.sort_by(|a, b| a.total_cmp(b));

    let truncated_trials = outcomes.iter().filter(|o| o.truncated).count();
    let percentiles = percentile_set(&weeks);
    let (mean, std) = mean_std(&weeks);
    let hist = histogram(&weeks);

    let effort_percentiles = if config.mode == SimulationMode::Complete {
        let mut effort: Vec<f64> = outcomes.iter().map(|o| o.effort_person_weeks).collect();
        effort.sort_by(|a, b| a.total_cmp(b));
        Some(percentile_set(&effort))
    } else {
        None
    };

    SimulationResult {
        percentiles,
        effort_percentiles,
        mean,
        std,
        histogram: hist,
        n_trials: outcomes.len(),
        truncated_trials,
        mode: config.mode,
        config_fingerprint: config.fingerprint(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThroughputHistory;

    fn simple_mode_config() -> SimulationConfig {
        SimulationConfig {
            tp_samples: ThroughputHistory::new(vec![5.0, 6.0, 7.0, 4.0, 8.0, 6.0, 5.0, 7.0]),
            backlog: 50,
            n_simulations: 10_000,
            mode: SimulationMode::Simple,
            team_size: 1,
            min_contributors: 1,
            max_contributors: 1,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn deterministic_for_fixed_seed_across_runs() {
        let config = simple_mode_config();
        let r1 = run(&config).unwrap();
        let r2 = run(&config).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn percentiles_are_monotone() {
        let config = simple_mode_config();
        let result = run(&config).unwrap();
        let p = result.percentiles;
        assert!(p.p10 <= p.p25);
        assert!(p.p25 <= p.p50);
        assert!(p.p50 <= p.p75);
        assert!(p.p75 <= p.p85);
        assert!(p.p85 <= p.p90);
        assert!(p.p90 <= p.p95);
    }

    #[test]
    fn simple_mode_matches_expected_percentiles() {
        // tp=[5,6,7,4,8,6,5,7], backlog=50, n=10000, simple, seed=42.
        // Expect p50 ~ 9, p85 ~ 9, mean ~ 8.5, p95 <= 11.
        let config = simple_mode_config();
        let result = run(&config).unwrap();
        assert!((result.percentiles.p50 - 9.0).abs() <= 2.0);
        assert!((result.percentiles.p85 - 9.0).abs() <= 2.0);
        assert!((result.mean - 8.5).abs() <= 2.0);
        assert!(result.percentiles.p95 <= 12.0);
        assert_eq!(result.n_trials, 10_000);
        assert_eq!(result.effort_percentiles, None);
    }

    #[test]
    fn complete_mode_matches_expected_percentiles() {
        // same throughput, backlog=50, complete, team_size=10, min=2,
        // max=5, s_curve_pct=20, seed=42. Expect p85 ~ 23 weeks, ~86 effort.
        let config = SimulationConfig {
            tp_samples: ThroughputHistory::new(vec![5.0, 6.0, 7.0, 4.0, 8.0, 6.0, 5.0, 7.0]),
            backlog: 50,
            n_simulations: 10_000,
            mode: SimulationMode::Complete,
            team_size: 10,
            min_contributors: 2,
            max_contributors: 5,
            s_curve_pct: 20,
            seed: Some(42),
            ..Default::default()
        };
        let result = run(&config).unwrap();
        let effort = result.effort_percentiles.expect("complete mode reports effort");
        assert!((result.percentiles.p85 - 23.0).abs() <= 5.0);
        assert!((effort.p85 - 86.0).abs() <= 20.0);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_trial_runs() {
        let config = SimulationConfig {
            tp_samples: ThroughputHistory::new(vec![]),
            ..Default::default()
        };
        assert!(matches!(run(&config), Err(ForecastError::ConfigInvalid(_))));
    }

    #[test]
    fn truncated_trials_are_counted_not_dropped() {
        let config = SimulationConfig {
            tp_samples: ThroughputHistory::new(vec![0.0, 0.0, 0.0, 0.01]),
            backlog: 1_000_000,
            n_simulations: 200,
            mode: SimulationMode::Simple,
            team_size: 1,
            min_contributors: 1,
            max_contributors: 1,
            seed: Some(1),
            ..Default::default()
        };
        let result = run(&config).unwrap();
        assert_eq!(result.truncated_trials, result.n_trials);
    }

    #[test]
    fn cancellable_matches_plain_run_when_never_cancelled() {
        let config = simple_mode_config();
        let cancel = AtomicBool::new(false);
        let result = run_cancellable(&config, &cancel, &()).unwrap();
        let plain = run(&config).unwrap();
        assert_eq!(result, plain);
    }

    #[test]
    fn cancellable_stops_when_flag_is_set() {
        let config = simple_mode_config();
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            run_cancellable(&config, &cancel, &()),
            Err(ForecastError::Cancelled)
        ));
    }

    #[test]
    fn different_seeds_produce_different_results() {
        let mut c1 = simple_mode_config();
        c1.seed = Some(1);
        let mut c2 = simple_mode_config();
        c2.seed = Some(2);
        let r1 = run(&c1).unwrap();
        let r2 = run(&c2).unwrap();
        assert_ne!(r1.percentiles.p50, r2.percentiles.p50);
    }
}
