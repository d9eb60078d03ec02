//! Simulation configuration
//!
//! [`SimulationConfig`] is the immutable input envelope to the Monte Carlo
//! [`crate::engine`]. Every numeric bound described in its field docs is
//! checked once, up front, by [`SimulationConfig::validate`] — callers never
//! see a partially-validated config reach the simulation loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{FieldViolation, ForecastError};

fn default_n_simulations() -> usize {
    10_000
}

fn default_s_curve_pct() -> u8 {
    0
}

/// Ordered sequence of non-negative weekly throughput samples.
///
/// Immutable within a simulation run; owned by whichever caller assembled it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThroughputHistory(pub Vec<f64>);

impl ThroughputHistory {
    pub fn new(samples: Vec<f64>) -> Self {
        Self(samples)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.0.is_empty() {
            0.0
        } else {
            self.0.iter().sum::<f64>() / self.0.len() as f64
        }
    }

    /// Sample variance (population, not Bessel-corrected — matches the
    /// degenerate-sampler check in `sampler::Sampler::fit`, which only cares
    /// whether the history is constant).
    pub fn variance(&self) -> f64 {
        if self.0.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.0.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / self.0.len() as f64
    }
}

/// Simulation mode: `Simple` is a constant team-of-one degenerate case of
/// `Complete`, which applies the full S-curve staffing profile and risks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    Simple,
    Complete,
}

/// A risk event: fires with probability `p`, and if it fires, adds a
/// triangular-distributed delay between `low` and `high` weeks, centered on
/// `likely`. See `burndown::apply_risks` for the exact timing semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskSpec {
    pub probability: f64,
    pub low_weeks: f64,
    pub likely_weeks: f64,
    pub high_weeks: f64,
}

/// The input envelope to the Monte Carlo engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub tp_samples: ThroughputHistory,
    pub backlog: u64,

    #[serde(default = "default_n_simulations")]
    pub n_simulations: usize,

    pub mode: SimulationMode,

    #[serde(default)]
    pub team_size: u32,
    #[serde(default)]
    pub min_contributors: u32,
    #[serde(default)]
    pub max_contributors: u32,
    #[serde(default = "default_s_curve_pct")]
    pub s_curve_pct: u8,

    #[serde(default)]
    pub lt_samples: Vec<f64>,
    #[serde(default)]
    pub split_rate_samples: Vec<f64>,
    #[serde(default)]
    pub risks: Vec<RiskSpec>,

    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tp_samples: ThroughputHistory::new(vec![]),
            backlog: 0,
            n_simulations: default_n_simulations(),
            mode: SimulationMode::Simple,
            team_size: 1,
            min_contributors: 1,
            max_contributors: 1,
            s_curve_pct: default_s_curve_pct(),
            lt_samples: Vec::new(),
            split_rate_samples: Vec::new(),
            risks: Vec::new(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Validate every invariant. Collects *all* violations rather
    /// than failing on the first one, so API clients see the whole picture
    /// in a single round trip.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let mut violations = Vec::new();

        if self.tp_samples.is_empty() {
            violations.push(FieldViolation::new(
                "tp_samples",
                "must contain at least one sample",
            ));
        } else if self.tp_samples.0.iter().all(|&x| x <= 0.0) {
            violations.push(FieldViolation::new(
                "tp_samples",
                "must contain at least one positive value",
            ));
        } else if self.tp_samples.0.iter().any(|&x| x < 0.0) {
            violations.push(FieldViolation::new(
                "tp_samples",
                "all samples must be non-negative",
            ));
        }

        if !(100..=1_000_000).contains(&self.n_simulations) {
            violations.push(FieldViolation::new(
                "n_simulations",
                "must be between 100 and 1,000,000",
            ));
        }

        if self.mode == SimulationMode::Complete {
            if self.team_size == 0 {
                violations.push(FieldViolation::new(
                    "team_size",
                    "must be at least 1 in complete mode",
                ));
            }
            if self.min_contributors == 0 {
                violations.push(FieldViolation::new(
                    "min_contributors",
                    "must be at least 1",
                ));
            }
            if self.min_contributors > self.max_contributors {
                violations.push(FieldViolation::new(
                    "min_contributors",
                    "must be <= max_contributors",
                ));
            }
            if self.max_contributors > self.team_size {
                violations.push(FieldViolation::new(
                    "max_contributors",
                    "must be <= team_size",
                ));
            }
            if self.s_curve_pct > 50 {
                violations.push(FieldViolation::new("s_curve_pct", "must be 0..=50"));
            }
        }

        for (i, rate) in self.split_rate_samples.iter().enumerate() {
            if !(0.2..=10.0).contains(rate) {
                violations.push(FieldViolation::new(
                    "split_rate_samples",
                    format!("index {i}: must be in [0.2, 10.0], got {rate}"),
                ));
            }
        }

        for lt in &self.lt_samples {
            if *lt < 0.0 {
                violations.push(FieldViolation::new(
                    "lt_samples",
                    "lead-time samples must be non-negative",
                ));
                break;
            }
        }

        for (i, risk) in self.risks.iter().enumerate() {
            if !(0.0..=1.0).contains(&risk.probability) {
                violations.push(FieldViolation::new(
                    "risks",
                    format!("index {i}: probability must be in [0, 1]"),
                ));
            }
            if !(risk.low_weeks <= risk.likely_weeks && risk.likely_weeks <= risk.high_weeks) {
                violations.push(FieldViolation::new(
                    "risks",
                    format!("index {i}: requires low <= likely <= high"),
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::config_invalid(violations))
        }
    }

    /// Stable fingerprint of this config, used as an idempotency key and as
    /// the `config_fingerprint` field on [`crate::model::result::SimulationResult`].
    ///
    /// A canonical JSON encoding (BTreeMap-ordered via `serde_json::to_value`
    /// + recursive key sort) is hashed with a 64-bit FNV-1a — deterministic
    /// across process runs and platforms, unlike `std::hash::Hash`'s default
    /// `RandomState`.
    pub fn fingerprint(&self) -> String {
        let value = serde_json::to_value(self).expect("SimulationConfig always serializes");
        let canonical = canonicalize(&value);
        format!("{:016x}", fnv1a(canonical.as_bytes()))
    }
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let keys: BTreeSet<&String> = map.keys().collect();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
