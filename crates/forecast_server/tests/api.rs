//! End-to-end HTTP surface tests, run against an in-memory SQLite
//! connection via `tower::ServiceExt::oneshot` — the standard
//! request-without-a-socket pattern for testing axum services.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use forecast_server::state::AppState;
use forecast_server::tasks::TaskRunner;
use forecast_server::{db, routes};

fn test_app() -> Router {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        tasks: Arc::new(TaskRunner::new(4, 100, Duration::from_secs(3600))),
        config: Arc::new(forecast_server::ServerConfig::from_env()),
    };
    routes::build_router().with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let app = test_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db"], "ok");
    assert_eq!(body["queue_depth"], 0);
    assert!(body["workers"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn create_and_fetch_project() {
    let app = test_app();
    let create = json!({
        "name": "Checkout Revamp",
        "throughput_history": [5.0, 6.0, 7.0, 4.0],
        "team_size": 5,
        "business_value": 80,
        "risk_level": "medium",
        "capacity_allocated": 2.5
    });
    let response = app
        .clone()
        .oneshot(json_request("POST", "/projects", create))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let id = created["id"].as_u64().unwrap();

    let response = app
        .oneshot(Request::builder().uri(format!("/projects/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["name"], "Checkout Revamp");
}

#[tokio::test]
async fn unknown_project_is_404() {
    let app = test_app();
    let response = app
        .oneshot(Request::builder().uri("/projects/999").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn simulate_config() -> Value {
    json!({
        "tp_samples": [5.0, 6.0, 7.0, 4.0, 8.0, 6.0, 5.0, 7.0],
        "backlog": 50,
        "n_simulations": 2000,
        "mode": "simple",
        "team_size": 1,
        "min_contributors": 1,
        "max_contributors": 1,
        "seed": 42
    })
}

#[tokio::test]
async fn simulate_returns_monotone_percentiles() {
    let app = test_app();
    let response = app
        .oneshot(json_request("POST", "/simulate", json!({"config": simulate_config()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    let p = &result["percentiles"];
    assert!(p["p50"].as_f64().unwrap() <= p["p85"].as_f64().unwrap());
    assert_eq!(result["n_trials"], 2000);
}

#[tokio::test]
async fn invalid_config_is_rejected_with_field_details() {
    let app = test_app();
    let mut config = simulate_config();
    config["tp_samples"] = json!([]);
    let response = app
        .oneshot(json_request("POST", "/simulate", json!({"config": config})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_kind"], "ConfigInvalid");
}

#[tokio::test]
async fn async_simulate_can_be_polled_to_completion() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/simulate/async", json!({"config": simulate_config()})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    let task_id = submitted["task_id"].as_str().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/tasks/{task_id}/result?timeout_ms=5000"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["state"], "succeeded");
    assert!(record["result"]["percentiles"]["p85"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn unknown_task_is_404() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/tasks/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn portfolio_cod_analysis_ranks_by_wsjf() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/portfolios",
            json!({
                "name": "Q4",
                "total_budget": 1_000_000.0,
                "total_capacity": 20.0,
                "start_date": "2025-01-01",
                "target_end_date": "2025-12-31"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let portfolio = body_json(response).await;
    let portfolio_id = portfolio["id"].as_u64().unwrap();

    for (project_id, priority, cod) in [(1u32, 1u8, 3000.0), (2, 2, 2000.0)] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/portfolios/{portfolio_id}/projects"),
                json!({
                    "project_id": project_id,
                    "priority_in_portfolio": priority,
                    "allocation_pct": 100,
                    "cod_weekly": cod,
                    "business_value": 60.0,
                    "time_criticality": 40.0,
                    "risk_reduction": 10.0
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/portfolios/{portfolio_id}/cod-analysis"),
            json!({
                "projects": [
                    {"project_id": 1, "config": simulate_config()},
                    {"project_id": 2, "config": simulate_config()},
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["best_strategy"], "wsjf");
}

#[tokio::test]
async fn simulate_rejects_oversized_n_with_413() {
    let app = test_app();
    let mut config = simulate_config();
    config["n_simulations"] = json!(5_001);
    let response = app
        .oneshot(json_request("POST", "/simulate", json!({"config": config})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error_kind"], "PayloadTooLarge");
}

#[tokio::test]
async fn meet_deadline_above_cap_dispatches_to_task_runner() {
    let app = test_app();
    let mut config = simulate_config();
    config["n_simulations"] = json!(6_000);
    let response = app
        .oneshot(json_request(
            "POST",
            "/forecast/meet-deadline",
            json!({"config": config, "start": "2025-10-01", "deadline": "2025-10-16"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["task_id"].as_str().is_some());
}

#[tokio::test]
async fn meet_deadline_below_cap_answers_inline() {
    let app = test_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/forecast/meet-deadline",
            json!({"config": simulate_config(), "start": "2025-10-01", "deadline": "2025-10-16"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["can_meet"].as_bool().is_some());
}

#[tokio::test]
async fn optimize_respects_budget_constraint() {
    let app = test_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/optimize",
            json!({
                "candidates": [
                    {"project_id": 1, "budget": 40000.0, "capacity": 4.0, "business_value": 80.0, "wsjf": 20.0, "risk_score": 50.0},
                    {"project_id": 2, "budget": 60000.0, "capacity": 6.0, "business_value": 90.0, "wsjf": 15.0, "risk_score": 75.0},
                ],
                "objective": "maximize_value",
                "constraints": {
                    "max_budget": 50000.0,
                    "max_capacity": 10.0
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    let selected: Vec<u64> = result["selected_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_u64().unwrap())
        .collect();
    assert!(selected.contains(&1));
    assert!(!selected.contains(&2));
}

#[tokio::test]
async fn portfolio_optimize_dispatches_and_resolves() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/portfolios",
            json!({
                "name": "Q1",
                "total_budget": 1_000_000.0,
                "total_capacity": 20.0,
                "start_date": "2025-01-01",
                "target_end_date": "2025-12-31"
            }),
        ))
        .await
        .unwrap();
    let portfolio = body_json(response).await;
    let portfolio_id = portfolio["id"].as_u64().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/portfolios/{portfolio_id}/optimize"),
            json!({
                "candidates": [
                    {"project_id": 1, "budget": 40000.0, "capacity": 4.0, "business_value": 80.0, "wsjf": 20.0, "risk_score": 50.0},
                ],
                "objective": "maximize_value",
                "constraints": {
                    "max_budget": 50000.0,
                    "max_capacity": 10.0
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    let task_id = submitted["task_id"].as_str().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/tasks/{task_id}/result?timeout_ms=5000"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let record = body_json(response).await;
    assert_eq!(record["state"], "succeeded");
    assert_eq!(record["result"]["selected_ids"], json!([1]));
}
