use axum::Router;
use axum::routing::{get, post};

use crate::handlers::projects::{create_project, get_accuracy, get_project, list_forecasts, list_projects, record_actual};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/forecasts", get(list_forecasts))
        .route("/projects/{id}/accuracy", get(get_accuracy))
        .route("/actuals", post(record_actual))
}
