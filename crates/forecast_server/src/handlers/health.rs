//! `GET /health`: a liveness/capacity snapshot, not a detailed
//! metrics endpoint — just enough for a load balancer or an operator to
//! tell the process is up and not drowning in queued work.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let queue_depth = state.tasks.pending_count().await;
    let db_ok = match state.db.lock() {
        Ok(conn) => crate::db::health_check(&conn).is_ok(),
        Err(_) => false,
    };

    let degraded = !db_ok || queue_depth >= state.config.task_queue_highwater;
    let status = if degraded { "degraded" } else { "healthy" };

    Json(json!({
        "status": status,
        "workers": state.config.worker_pool_size,
        "queue_depth": queue_depth,
        "db": if db_ok { "ok" } else { "down" },
    }))
}
