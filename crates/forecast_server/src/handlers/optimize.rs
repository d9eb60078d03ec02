//! Selection Optimizer handlers. The bare `/optimize*` routes
//! run inline, bounded by `MILP_TIME_LIMIT_SECONDS`; `/portfolios/{id}/optimize`
//! dispatches to the Task Runner and returns a `task_id`, the same
//! convenience/scale split `/simulate` and `/simulate/async` draw.

use axum::Json;
use axum::extract::{Path, State};

use forecast_core::optimize::{self, Candidate, ScenarioComparison};

use crate::error::ApiResult;
use crate::models::{CompareScenariosRequest, OptimizeRequest, ParetoFrontierRequest, TaskSubmittedResponse};
use crate::state::AppState;
use crate::tasks::JobContext;

pub async fn solve(
    State(state): State<AppState>,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Json<optimize::SolveResult>> {
    let candidates: Vec<Candidate> = req.candidates.into_iter().map(Into::into).collect();
    let constraints = req.constraints.into();
    let result = optimize::solve_with_time_limit(&candidates, req.objective, &constraints, state.config.milp_time_limit)?;
    Ok(Json(result))
}

/// `POST /portfolios/{id}/optimize`: same request shape as [`solve`], run
/// through the Task Runner instead of inline. `portfolio_id` isn't needed
/// by the solver itself (candidates are supplied in the body) — it's kept
/// on the path purely to scope the task to a portfolio in logs/routing.
pub async fn submit_optimize(
    State(state): State<AppState>,
    Path(_portfolio_id): Path<u32>,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Json<TaskSubmittedResponse>> {
    let candidates: Vec<Candidate> = req.candidates.into_iter().map(Into::into).collect();
    let constraints = req.constraints.into();
    let objective = req.objective;
    let time_limit = state.config.milp_time_limit;

    let task_id = state
        .tasks
        .submit("optimize", move |_ctx: &JobContext| {
            let result = optimize::solve_with_time_limit(&candidates, objective, &constraints, time_limit)
                .map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        })
        .await?;
    Ok(Json(TaskSubmittedResponse { task_id }))
}

pub async fn compare_scenarios(
    Json(req): Json<CompareScenariosRequest>,
) -> ApiResult<Json<ScenarioComparison>> {
    let candidates: Vec<Candidate> = req.candidates.into_iter().map(Into::into).collect();
    let scenarios: Vec<(String, optimize::Constraints)> = req
        .scenarios
        .into_iter()
        .map(|s| (s.label, s.constraints.into()))
        .collect();
    let comparison = optimize::compare_scenarios(&candidates, req.objective, &scenarios)?;
    Ok(Json(comparison))
}

pub async fn pareto_frontier(
    Json(req): Json<ParetoFrontierRequest>,
) -> ApiResult<Json<Vec<optimize::ParetoPoint>>> {
    let candidates: Vec<Candidate> = req.candidates.into_iter().map(Into::into).collect();
    let base = req.base.into();
    let points = optimize::pareto_frontier(&candidates, req.objective, &base, req.k)?;
    Ok(Json(points))
}
