use axum::Router;
use axum::routing::post;

use crate::handlers::optimize::{compare_scenarios, pareto_frontier, solve};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/optimize", post(solve))
        .route("/optimize/compare-scenarios", post(compare_scenarios))
        .route("/optimize/pareto-frontier", post(pareto_frontier))
}
