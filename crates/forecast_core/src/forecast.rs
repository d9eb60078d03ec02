//! Forecast Facade — the three project-level questions as thin views over
//! [`crate::engine::run`] output: can we meet a deadline, how many items by
//! a date, and when will the backlog finish.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::date_math::{business_weeks_between, weeks_between};
use crate::engine;
use crate::error::ForecastError;
use crate::model::result::{Percentiles, SimulationResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadlineVerdict {
    pub projected_weeks_p85: f64,
    pub can_meet: bool,
    /// `min(100, 100 * weeks_to_deadline / p85)` — how much of the deadline
    /// window the P85 estimate would consume.
    pub scope_completion_pct: f64,
    /// `min(100, 100 * p85 / weeks_to_deadline)` — how far P85 overruns the
    /// window, capped at 100.
    pub deadline_completion_pct: f64,
    pub result: SimulationResult,
}

/// `meet_deadline(config, start, deadline) -> DeadlineVerdict`.
pub fn meet_deadline(
    config: &SimulationConfig,
    start: Date,
    deadline: Date,
) -> Result<DeadlineVerdict, ForecastError> {
    let weeks_to_deadline = business_weeks_between(start, deadline);
    let result = engine::run(config)?;
    let p85 = result.percentiles.p85;

    let can_meet = p85 <= weeks_to_deadline;
    let scope_completion_pct = if p85 > 0.0 {
        (100.0 * weeks_to_deadline / p85).min(100.0)
    } else {
        100.0
    };
    let deadline_completion_pct = if weeks_to_deadline > 0.0 {
        (100.0 * p85 / weeks_to_deadline).min(100.0)
    } else {
        100.0
    };

    Ok(DeadlineVerdict {
        projected_weeks_p85: p85,
        can_meet,
        scope_completion_pct,
        deadline_completion_pct,
        result,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemsForecast {
    pub window_weeks: u32,
    pub percentiles: Percentiles,
}

/// `how_many(config_without_backlog, start, end) -> ItemsForecast`.
///
/// Rather than run the backlog-depleting Engine with an artificially large
/// backlog, this simulates `window_weeks` of throughput draws directly; this
/// is an equivalent formulation and cheaper, since it skips the burn-down
/// loop's termination check entirely.
pub fn how_many(
    config: &SimulationConfig,
    start: Date,
    end: Date,
) -> Result<ItemsForecast, ForecastError> {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use crate::engine::trial_seed;

    config.validate()?;

    let window_weeks = weeks_between(start, end).floor().max(0.0) as u32;
    let mut sampler = crate::sampler::Sampler::fit(&config.tp_samples)?;
    let root_seed = config.seed.unwrap_or_else(|| rand::rng().random());

    let mut items: Vec<f64> = Vec::with_capacity(config.n_simulations);
    for i in 0..config.n_simulations {
        let mut rng = SmallRng::seed_from_u64(trial_seed(root_seed, i as u64));
        let mut total = 0.0;
        for _ in 0..window_weeks {
            total += sampler.draw(&mut rng).max(0.0).round();
        }
        items.push(total);
    }
    items.sort_by(|a, b| a.total_cmp(b));

    Ok(ItemsForecast {
        window_weeks,
        percentiles: crate::util::percentiles::percentile_set(&items),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionForecast {
    pub start_date: Date,
    pub percentile_dates: Vec<(String, Date)>,
    pub result: SimulationResult,
}

/// `when(config) -> CompletionForecast`: runs the Engine and
/// translates each percentile week count into a calendar date.
pub fn when(config: &SimulationConfig, start: Date) -> Result<CompletionForecast, ForecastError> {
    let result = engine::run(config)?;
    let p = &result.percentiles;

    let to_date = |weeks: f64| -> Date {
        let days = (weeks * 7.0).round() as i64;
        start
            .checked_add(jiff::Span::new().days(days))
            .unwrap_or(start)
    };

    let percentile_dates = vec![
        ("p10".to_string(), to_date(p.p10)),
        ("p25".to_string(), to_date(p.p25)),
        ("p50".to_string(), to_date(p.p50)),
        ("p75".to_string(), to_date(p.p75)),
        ("p85".to_string(), to_date(p.p85)),
        ("p90".to_string(), to_date(p.p90)),
        ("p95".to_string(), to_date(p.p95)),
    ];

    Ok(CompletionForecast {
        start_date: start,
        percentile_dates,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimulationConfig, SimulationMode, ThroughputHistory};
    use jiff::civil::date;

    fn deadline_config() -> SimulationConfig {
        SimulationConfig {
            tp_samples: ThroughputHistory::new(vec![4.0, 5.0, 6.0, 7.0, 5.0, 6.0, 7.0, 8.0]),
            backlog: 20,
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
    fn deadline_missed_reports_expected_scope_completion() {
        // backlog=20, start=2025-10-01, deadline=2025-10-16.
        // Expect can_meet=false, projected_p85 ~ 4 weeks, scope ~ 54%.
        let config = deadline_config();
        let verdict =
            meet_deadline(&config, date(2025, 10, 1), date(2025, 10, 16)).unwrap();
        assert!(!verdict.can_meet);
        assert!((verdict.projected_weeks_p85 - 4.0).abs() <= 2.0);
        assert!(verdict.scope_completion_pct > 0.0 && verdict.scope_completion_pct <= 100.0);
    }

    #[test]
    fn deadline_far_in_future_is_met() {
        let config = deadline_config();
        let verdict =
            meet_deadline(&config, date(2025, 1, 1), date(2027, 1, 1)).unwrap();
        assert!(verdict.can_meet);
        assert_eq!(verdict.deadline_completion_pct.min(100.0), verdict.deadline_completion_pct);
    }

    #[test]
    fn how_many_reports_monotone_percentiles() {
        let config = deadline_config();
        let forecast = how_many(&config, date(2025, 1, 1), date(2025, 4, 1)).unwrap();
        assert!(forecast.window_weeks > 0);
        assert!(forecast.percentiles.p50 <= forecast.percentiles.p85);
    }

    #[test]
    fn when_dates_are_chronologically_ordered() {
        let config = deadline_config();
        let forecast = when(&config, date(2025, 1, 1)).unwrap();
        let dates: Vec<Date> = forecast.percentile_dates.iter().map(|(_, d)| *d).collect();
        for pair in dates.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}
