mod forecasts;
mod optimize;
mod portfolios;
mod projects;
mod tasks;

use axum::Router;
use axum::routing::get;

use crate::handlers::health::health;
use crate::state::AppState;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(projects::routes())
        .merge(forecasts::routes())
        .merge(tasks::routes())
        .merge(portfolios::routes())
        .merge(optimize::routes())
}
