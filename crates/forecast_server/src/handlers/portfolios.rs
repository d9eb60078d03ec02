//! Portfolio and portfolio-membership CRUD handlers.

use axum::Json;
use axum::extract::{Path, State};

use forecast_core::model::{Portfolio, PortfolioId, PortfolioProject, PortfolioStatus};

use crate::db;
use crate::error::ApiResult;
use crate::models::{AddPortfolioProjectRequest, CreatePortfolioRequest};
use crate::state::AppState;

pub async fn create_portfolio(
    State(state): State<AppState>,
    Json(req): Json<CreatePortfolioRequest>,
) -> ApiResult<Json<Portfolio>> {
    let conn = state.db.lock()?;
    let portfolio = Portfolio {
        id: PortfolioId(0),
        name: req.name,
        total_budget: req.total_budget,
        total_capacity: req.total_capacity,
        status: PortfolioStatus::Active,
        start_date: req.start_date,
        target_end_date: req.target_end_date,
    };
    let id = db::create_portfolio(&conn, &portfolio)?;
    Ok(Json(db::get_portfolio(&conn, id)?))
}

pub async fn list_portfolios(State(state): State<AppState>) -> ApiResult<Json<Vec<Portfolio>>> {
    let conn = state.db.lock()?;
    Ok(Json(db::list_portfolios(&conn)?))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Json<Portfolio>> {
    let conn = state.db.lock()?;
    Ok(Json(db::get_portfolio(&conn, PortfolioId(id))?))
}

pub async fn add_project(
    State(state): State<AppState>,
    Path(portfolio_id): Path<u32>,
    Json(req): Json<AddPortfolioProjectRequest>,
) -> ApiResult<Json<Vec<PortfolioProject>>> {
    let conn = state.db.lock()?;
    let member = req.into_member(PortfolioId(portfolio_id));
    db::add_project_to_portfolio(&conn, &member)?;
    Ok(Json(db::list_portfolio_projects(&conn, PortfolioId(portfolio_id))?))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Path(portfolio_id): Path<u32>,
) -> ApiResult<Json<Vec<PortfolioProject>>> {
    let conn = state.db.lock()?;
    Ok(Json(db::list_portfolio_projects(&conn, PortfolioId(portfolio_id))?))
}
