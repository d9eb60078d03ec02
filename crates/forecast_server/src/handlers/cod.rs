//! CoD Sequencer handler. Computes each project's P85 duration
//! by running the Engine once per project, then sequences the portfolio's
//! memberships under all four strategies.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};

use forecast_core::cod::{self, CodReport};
use forecast_core::model::{PortfolioId, ProjectId};
use forecast_core::util::percentiles::nearest_rank;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::CodAnalysisRequest;
use crate::state::AppState;

pub async fn analyze(
    State(state): State<AppState>,
    Path(portfolio_id): Path<u32>,
    Json(req): Json<CodAnalysisRequest>,
) -> ApiResult<Json<CodReport>> {
    let members = {
        let conn = state.db.lock()?;
        db::list_portfolio_projects(&conn, PortfolioId(portfolio_id))?
    };

    let mut durations: HashMap<ProjectId, f64> = HashMap::with_capacity(req.projects.len());
    for p in req.projects {
        let outcomes = forecast_core::engine::trials(&p.config)?;
        let mut weeks: Vec<f64> = outcomes.iter().map(|o| o.weeks as f64).collect();
        weeks.sort_by(|a, b| a.total_cmp(b));
        durations.insert(ProjectId(p.project_id), nearest_rank(&weeks, 0.85));
    }

    if members.is_empty() {
        return Err(ApiError::ConfigInvalid(vec![(
            "portfolio_projects".to_string(),
            "portfolio has no project memberships".to_string(),
        )]));
    }

    let report = cod::sequence(&members, &durations)?;
    Ok(Json(report))
}
