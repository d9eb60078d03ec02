//! Forecast Facade handlers and `/simulate` (the Task Runner's sync
//! convenience path). Below [`crate::SYNC_SIMULATION_CAP`] trials these
//! answer inline; above it the three facade operations dispatch to the
//! Task Runner the same way `/simulate/async` does, so a client never
//! blocks a request past the cap.

use axum::Json;
use axum::extract::State;

use forecast_core::forecast::{self, CompletionForecast, DeadlineVerdict, ItemsForecast};
use forecast_core::model::ForecastType;

use crate::SYNC_SIMULATION_CAP;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{HowManyRequest, MeetDeadlineRequest, SimulateRequest, SyncOrAsync, WhenRequest};
use crate::state::AppState;
use crate::tasks::JobContext;

pub async fn meet_deadline(
    State(state): State<AppState>,
    Json(req): Json<MeetDeadlineRequest>,
) -> ApiResult<SyncOrAsync<DeadlineVerdict>> {
    if req.config.n_simulations <= SYNC_SIMULATION_CAP {
        let verdict = forecast::meet_deadline(&req.config, req.start, req.deadline)?;
        return Ok(SyncOrAsync::Sync(verdict));
    }

    let (config, start, deadline) = (req.config, req.start, req.deadline);
    let task_id = state
        .tasks
        .submit("meet_deadline", move |_ctx: &JobContext| {
            let verdict = forecast::meet_deadline(&config, start, deadline).map_err(|e| e.to_string())?;
            serde_json::to_value(verdict).map_err(|e| e.to_string())
        })
        .await?;
    Ok(SyncOrAsync::Dispatched(task_id))
}

pub async fn how_many(
    State(state): State<AppState>,
    Json(req): Json<HowManyRequest>,
) -> ApiResult<SyncOrAsync<ItemsForecast>> {
    if req.config.n_simulations <= SYNC_SIMULATION_CAP {
        let result = forecast::how_many(&req.config, req.start, req.end)?;
        return Ok(SyncOrAsync::Sync(result));
    }

    let (config, start, end) = (req.config, req.start, req.end);
    let task_id = state
        .tasks
        .submit("how_many", move |_ctx: &JobContext| {
            let result = forecast::how_many(&config, start, end).map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        })
        .await?;
    Ok(SyncOrAsync::Dispatched(task_id))
}

pub async fn when(
    State(state): State<AppState>,
    Json(req): Json<WhenRequest>,
) -> ApiResult<SyncOrAsync<CompletionForecast>> {
    if req.config.n_simulations <= SYNC_SIMULATION_CAP {
        let result = forecast::when(&req.config, req.start)?;
        return Ok(SyncOrAsync::Sync(result));
    }

    let (config, start) = (req.config, req.start);
    let task_id = state
        .tasks
        .submit("when", move |_ctx: &JobContext| {
            let result = forecast::when(&config, start).map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        })
        .await?;
    Ok(SyncOrAsync::Dispatched(task_id))
}

/// `POST /simulate`: runs the Engine synchronously and, when `project_id`
/// is present, persists the result as a `Forecast`. Rejects with
/// `413` above the sync cap rather than silently dispatching — clients are
/// expected to call `/simulate/async` themselves for large runs.
pub async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> ApiResult<Json<forecast_core::model::result::SimulationResult>> {
    if req.config.n_simulations > SYNC_SIMULATION_CAP {
        return Err(ApiError::PayloadTooLarge {
            n: req.config.n_simulations,
            cap: SYNC_SIMULATION_CAP,
        });
    }

    let result = forecast_core::engine::run(&req.config)?;

    if let Some(project_id) = req.project_id {
        let conn = state.db.lock()?;
        db::save_forecast(
            &conn,
            forecast_core::model::ProjectId(project_id),
            ForecastType::Deadline,
            &req.config,
            &result,
            result.percentiles.p85,
        )?;
    }

    Ok(Json(result))
}
