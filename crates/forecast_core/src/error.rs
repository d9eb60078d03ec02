//! Typed error taxonomy for the forecasting engine.
//!
//! Every layer either returns one of these tagged results or propagates one
//! via `?` / `From`. The HTTP layer (`forecast_server`) maps each variant to
//! a status code in exactly one place.

use thiserror::Error;

/// A single offending field from config validation, with the reason it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while fitting or drawing from a [`crate::sampler::Sampler`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    #[error("throughput history is empty")]
    EmptyHistory,
    #[error("weibull fit failed to converge: {reason}")]
    FitFailed { reason: String },
}

/// Errors surfaced by the Monte Carlo engine and everything built on top of it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    #[error("invalid simulation configuration")]
    ConfigInvalid(Vec<FieldViolation>),

    #[error("sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("simulation was cancelled")]
    Cancelled,
}

impl ForecastError {
    pub fn config_invalid(violations: Vec<FieldViolation>) -> Self {
        ForecastError::ConfigInvalid(violations)
    }
}

/// Errors from the CoD sequencer (pure function, no I/O).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SequencingError {
    #[error("no projects with positive duration to sequence")]
    NoSequenceableProjects,
    #[error("dependency cycle detected among portfolio projects: {0:?}")]
    DependencyCycle(Vec<crate::model::ProjectId>),
}

/// Status of a MILP selection solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimeLimit,
}

/// Errors from the selection optimizer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OptimizeError {
    #[error("no candidate projects supplied")]
    NoCandidates,
    #[error("infeasible: {binding_constraint}")]
    Infeasible { binding_constraint: String },
}

/// Errors from the Portfolio Simulator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("no projects supplied")]
    NoProjects,
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Sequencing(#[from] SequencingError),
}

