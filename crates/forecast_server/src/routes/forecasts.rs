use axum::Router;
use axum::routing::post;

use crate::handlers::forecasts::{how_many, meet_deadline, simulate, when};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/simulate", post(simulate))
        .route("/forecast/meet-deadline", post(meet_deadline))
        .route("/forecast/how-many", post(how_many))
        .route("/forecast/when", post(when))
}
