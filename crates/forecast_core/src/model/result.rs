//! Output types produced by the Monte Carlo [`crate::engine`].

use serde::{Deserialize, Serialize};

/// The standard percentile set reported for every distributional output
/// (the standard percentile set reported on `SimulationResult`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p85: f64,
    pub p90: f64,
    pub p95: f64,
}

/// One bin of a histogram covering `[min, max]` of observed values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
}

/// Distributional view over every trial run by the engine for one config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub percentiles: Percentiles,
    /// Present only in `complete` mode (person-weeks of effort).
    pub effort_percentiles: Option<Percentiles>,
    pub mean: f64,
    pub std: f64,
    pub histogram: Histogram,
    pub n_trials: usize,
    pub truncated_trials: usize,
    pub mode: crate::config::SimulationMode,
    pub config_fingerprint: String,
}
