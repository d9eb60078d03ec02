use axum::Router;
use axum::routing::{get, post};

use crate::handlers::tasks::{cancel, result, status, submit_simulate};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/simulate/async", post(submit_simulate))
        .route("/tasks/{id}", get(status))
        .route("/tasks/{id}/cancel", post(cancel))
        .route("/tasks/{id}/result", get(result))
}
