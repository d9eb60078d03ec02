//! HTTP surface over `forecast_core`: persistence, the Task Runner, and
//! route handlers. Split into a library so
//! `tests/` can build a router against an in-memory database the same way
//! `main` builds one against a real file, without duplicating wiring.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod tasks;

pub use config::ServerConfig;
pub use state::AppState;

/// Above this many trials, `/simulate` and the Forecast Facade endpoints
/// dispatch to the Task Runner instead of answering inline ("sync
/// for small n, otherwise dispatch to Task Runner the same way
/// `/simulate/async` does").
pub const SYNC_SIMULATION_CAP: usize = 5_000;
