//! Async job submission and polling — the Task Runner's
//! HTTP surface. Long-running Monte Carlo work (whole-portfolio simulation,
//! MILP optimization at scale) is submitted here and polled to completion
//! rather than held open on a single request.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use forecast_core::engine::{self, ProgressSink};
use forecast_core::portfolio::{self, ProjectInput};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{PortfolioSimulateRequest, SimulateRequest, TaskSubmittedResponse};
use crate::state::AppState;
use crate::tasks::{JobContext, TaskRecord};

pub async fn submit_simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> ApiResult<Json<TaskSubmittedResponse>> {
    let config = req.config;
    let task_id = state
        .tasks
        .submit("simulate", move |ctx: &JobContext| {
            let cancel = ctx.cancel_flag();
            let result = engine::run_cancellable(&config, cancel, ctx as &dyn ProgressSink)
                .map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        })
        .await?;
    Ok(Json(TaskSubmittedResponse { task_id }))
}

pub async fn submit_portfolio_simulate(
    State(state): State<AppState>,
    Path(portfolio_id): Path<u32>,
    Json(req): Json<PortfolioSimulateRequest>,
) -> ApiResult<Json<TaskSubmittedResponse>> {
    let members = {
        let conn = state.db.lock()?;
        let members = db::list_portfolio_projects(&conn, forecast_core::model::PortfolioId(portfolio_id))?;
        crate::models::members_by_id(members)
    };

    let mut inputs = Vec::with_capacity(req.projects.len());
    for p in req.projects {
        let project_id = forecast_core::model::ProjectId(p.project_id);
        let member = members
            .get(&project_id)
            .cloned()
            .ok_or(ApiError::ProjectNotFound(p.project_id as i64))?;
        inputs.push(ProjectInput {
            project_id,
            config: p.config,
            member,
        });
    }

    let execution_mode = req.execution_mode;
    let task_id = state
        .tasks
        .submit("portfolio_simulate", move |ctx: &JobContext| {
            let cancel = ctx.cancel_flag();
            let value = match execution_mode {
                forecast_core::model::ExecutionMode::Parallel => {
                    portfolio::simulate_parallel_cancellable(&inputs, cancel).map_err(|e| e.to_string())?
                }
                forecast_core::model::ExecutionMode::Sequential => {
                    portfolio::simulate_sequential_cancellable(&inputs, cancel).map_err(|e| e.to_string())?
                }
                forecast_core::model::ExecutionMode::Compare => {
                    let compare = portfolio::compare_cancellable(&inputs, cancel).map_err(|e| e.to_string())?;
                    return serde_json::to_value(compare).map_err(|e| e.to_string());
                }
            };
            serde_json::to_value(value).map_err(|e| e.to_string())
        })
        .await?;
    Ok(Json(TaskSubmittedResponse { task_id }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskRecord>> {
    Ok(Json(state.tasks.status(id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.tasks.cancel(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub timeout_ms: Option<u64>,
}

pub async fn result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ResultQuery>,
) -> ApiResult<Json<TaskRecord>> {
    let timeout = q.timeout_ms.map(std::time::Duration::from_millis);
    Ok(Json(state.tasks.result(id, timeout).await?))
}
