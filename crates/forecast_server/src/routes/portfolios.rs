use axum::Router;
use axum::routing::{get, post};

use crate::handlers::cod::analyze;
use crate::handlers::optimize::submit_optimize;
use crate::handlers::portfolios::{add_project, create_portfolio, get_portfolio, list_portfolios, list_projects};
use crate::handlers::tasks::submit_portfolio_simulate;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/portfolios", post(create_portfolio).get(list_portfolios))
        .route("/portfolios/{id}", get(get_portfolio))
        .route("/portfolios/{id}/projects", post(add_project).get(list_projects))
        .route("/portfolios/{id}/simulate", post(submit_portfolio_simulate))
        .route("/portfolios/{id}/cod-analysis", post(analyze))
        .route("/portfolios/{id}/optimize", post(submit_optimize))
}
