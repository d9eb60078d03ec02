//! Probabilistic forecasting engine for software delivery.
//!
//! Given a history of weekly throughput samples and a project configuration,
//! this crate answers three questions as probability distributions
//! (P50/P85/P95): will we meet a deadline, how many items will be done by a
//! date, and when will the backlog finish. On top of per-project forecasts
//! it aggregates portfolios of projects into Monte Carlo forecasts, a
//! WSJF-based Cost-of-Delay sequencer, and a MILP project selector.
//!
//! Module layout, leaves first:
//!
//! - [`sampler`] fits a Weibull distribution to a throughput history.
//! - [`burndown`] runs one Monte Carlo trial.
//! - [`engine`] runs many trials in parallel and aggregates them.
//! - [`forecast`] is a thin facade over the engine for the three
//!   project-level questions.
//! - [`portfolio`] composes per-project engine runs into portfolio-level
//!   Monte Carlo forecasts under parallel/sequential execution policies.
//! - [`cod`] sequences portfolio projects by Cost of Delay.
//! - [`optimize`] selects a subset of projects under budget/capacity
//!   constraints via branch-and-bound MILP.
//!
//! [`config`], [`error`], and [`model`] hold the shared input/output and
//! error types; [`util`] holds percentile/histogram helpers used across
//! several modules.

#![warn(clippy::all)]

pub mod burndown;
pub mod cod;
pub mod config;
pub mod date_math;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod model;
pub mod optimize;
pub mod portfolio;
pub mod sampler;
pub mod util;

pub use config::{RiskSpec, SimulationConfig, SimulationMode, ThroughputHistory};
pub use error::ForecastError;
pub use model::result::SimulationResult;
