//! Project CRUD and accuracy-tracking handlers.

use axum::Json;
use axum::extract::{Path, State};

use forecast_core::model::{Actual, ForecastId, ProjectId, compute_accuracy};

use crate::db;
use crate::error::ApiResult;
use crate::models::{CreateProjectRequest, RecordActualRequest};
use crate::state::AppState;

pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<Json<forecast_core::model::Project>> {
    let conn = state.db.lock()?;
    let id = db::create_project(&conn, &req.into_project(ProjectId(0)))?;
    Ok(Json(db::get_project(&conn, id)?))
}

pub async fn list_projects(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<forecast_core::model::Project>>> {
    let conn = state.db.lock()?;
    Ok(Json(db::list_projects(&conn)?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Json<forecast_core::model::Project>> {
    let conn = state.db.lock()?;
    Ok(Json(db::get_project(&conn, ProjectId(id))?))
}

pub async fn list_forecasts(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Json<Vec<forecast_core::model::Forecast>>> {
    let conn = state.db.lock()?;
    Ok(Json(db::list_forecasts(&conn, ProjectId(id))?))
}

pub async fn record_actual(
    State(state): State<AppState>,
    Json(req): Json<RecordActualRequest>,
) -> ApiResult<Json<forecast_core::model::AccuracyStats>> {
    let conn = state.db.lock()?;
    let forecast = db::load_forecast(&conn, ForecastId(req.forecast_id))?;
    let actual = Actual {
        id: 0,
        forecast_id: ForecastId(req.forecast_id),
        actual_weeks: req.actual_weeks,
        actual_items: req.actual_items,
        recorded_at: req
            .recorded_at
            .unwrap_or_else(|| jiff::Zoned::now().date()),
    };
    db::record_actual(&conn, &actual)?;
    let pairs = db::forecast_actual_pairs(&conn, forecast.project_id)?;
    Ok(Json(compute_accuracy(&pairs)))
}

pub async fn get_accuracy(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Json<forecast_core::model::AccuracyStats>> {
    let conn = state.db.lock()?;
    let pairs = db::forecast_actual_pairs(&conn, ProjectId(id))?;
    Ok(Json(compute_accuracy(&pairs)))
}
