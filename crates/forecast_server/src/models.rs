//! HTTP request/response DTOs.
//!
//! Most of `forecast_core`'s own types already derive `Serialize`/
//! `Deserialize` and are used directly in responses; this module holds only
//! the request envelopes and the handful of response shapes that don't map
//! 1:1 onto a core type — keeping the DB/core model distinct from the wire
//! shape a client actually sends and receives.

use std::collections::{BTreeSet, HashMap};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use forecast_core::config::{SimulationConfig, ThroughputHistory};
use forecast_core::model::{ExecutionMode, ProjectId, ProjectStatus, RiskLevel};
use forecast_core::optimize::{Constraints, Objective};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub throughput_history: Vec<f64>,
    pub team_size: u32,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    pub business_value: u8,
    pub risk_level: RiskLevel,
    pub capacity_allocated: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateProjectRequest {
    pub fn into_project(self, id: ProjectId) -> forecast_core::model::Project {
        forecast_core::model::Project {
            id,
            name: self.name,
            throughput_history: ThroughputHistory::new(self.throughput_history),
            team_size: self.team_size,
            status: self.status.unwrap_or(ProjectStatus::Active),
            business_value: self.business_value,
            risk_level: self.risk_level,
            capacity_allocated: self.capacity_allocated,
            tags: self.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub config: SimulationConfig,
    /// Save the result as a `Forecast` tied to this project. When
    /// absent, the result is returned without being persisted.
    #[serde(default)]
    pub project_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MeetDeadlineRequest {
    pub config: SimulationConfig,
    pub start: Date,
    pub deadline: Date,
}

#[derive(Debug, Deserialize)]
pub struct HowManyRequest {
    pub config: SimulationConfig,
    pub start: Date,
    pub end: Date,
}

#[derive(Debug, Deserialize)]
pub struct WhenRequest {
    pub config: SimulationConfig,
    pub start: Date,
}

#[derive(Debug, Deserialize)]
pub struct RecordActualRequest {
    pub forecast_id: u32,
    pub actual_weeks: f64,
    pub actual_items: u64,
    #[serde(default)]
    pub recorded_at: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePortfolioRequest {
    pub name: String,
    pub total_budget: f64,
    pub total_capacity: f64,
    pub start_date: Date,
    pub target_end_date: Date,
}

#[derive(Debug, Deserialize)]
pub struct AddPortfolioProjectRequest {
    pub project_id: u32,
    pub priority_in_portfolio: u8,
    pub allocation_pct: u8,
    pub cod_weekly: f64,
    pub business_value: f64,
    pub time_criticality: f64,
    pub risk_reduction: f64,
    #[serde(default)]
    pub dependencies: Vec<u32>,
}

impl AddPortfolioProjectRequest {
    pub fn into_member(self, portfolio_id: forecast_core::model::PortfolioId) -> forecast_core::model::PortfolioProject {
        forecast_core::model::PortfolioProject {
            portfolio_id,
            project_id: ProjectId(self.project_id),
            priority_in_portfolio: self.priority_in_portfolio,
            allocation_pct: self.allocation_pct,
            cod_weekly: self.cod_weekly,
            business_value: self.business_value,
            time_criticality: self.time_criticality,
            risk_reduction: self.risk_reduction,
            dependencies: self.dependencies.into_iter().map(ProjectId).collect::<BTreeSet<_>>(),
        }
    }
}

/// One project's simulation inputs for a portfolio-level run. The member
/// row (CoD/WSJF inputs, dependencies) is loaded from storage by project id;
/// only the simulation config varies per request.
#[derive(Debug, Deserialize)]
pub struct PortfolioProjectConfig {
    pub project_id: u32,
    pub config: SimulationConfig,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioSimulateRequest {
    pub execution_mode: ExecutionMode,
    pub projects: Vec<PortfolioProjectConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CodAnalysisRequest {
    pub projects: Vec<PortfolioProjectConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CandidateDto {
    pub project_id: u32,
    pub budget: f64,
    pub capacity: f64,
    pub business_value: f64,
    pub wsjf: f64,
    pub risk_score: f64,
}

impl From<CandidateDto> for forecast_core::optimize::Candidate {
    fn from(dto: CandidateDto) -> Self {
        forecast_core::optimize::Candidate {
            project_id: ProjectId(dto.project_id),
            budget: dto.budget,
            capacity: dto.capacity,
            business_value: dto.business_value,
            wsjf: dto.wsjf,
            risk_score: dto.risk_score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConstraintsDto {
    pub max_budget: f64,
    pub max_capacity: f64,
    #[serde(default)]
    pub min_business_value: Option<f64>,
    #[serde(default)]
    pub max_risk_score: Option<f64>,
    #[serde(default)]
    pub mandatory: Vec<u32>,
    #[serde(default)]
    pub excluded: Vec<u32>,
}

impl From<ConstraintsDto> for Constraints {
    fn from(dto: ConstraintsDto) -> Self {
        Constraints {
            max_budget: dto.max_budget,
            max_capacity: dto.max_capacity,
            min_business_value: dto.min_business_value,
            max_risk_score: dto.max_risk_score,
            mandatory: dto.mandatory.into_iter().map(ProjectId).collect(),
            excluded: dto.excluded.into_iter().map(ProjectId).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub candidates: Vec<CandidateDto>,
    pub objective: Objective,
    pub constraints: ConstraintsDto,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioDto {
    pub label: String,
    pub constraints: ConstraintsDto,
}

#[derive(Debug, Deserialize)]
pub struct CompareScenariosRequest {
    pub candidates: Vec<CandidateDto>,
    pub objective: Objective,
    pub scenarios: Vec<ScenarioDto>,
}

#[derive(Debug, Deserialize)]
pub struct ParetoFrontierRequest {
    pub candidates: Vec<CandidateDto>,
    pub objective: Objective,
    pub base: ConstraintsDto,
    #[serde(default = "default_pareto_points")]
    pub k: usize,
}

fn default_pareto_points() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct TaskSubmittedResponse {
    pub task_id: Uuid,
}

/// Response shape for an endpoint that answers inline below the sync cap
/// and dispatches to the Task Runner above it. `200` with the
/// result body in the sync case, `202` with `{task_id}` in the async one —
/// callers tell the two apart by status code.
pub enum SyncOrAsync<T> {
    Sync(T),
    Dispatched(Uuid),
}

impl<T: Serialize> IntoResponse for SyncOrAsync<T> {
    fn into_response(self) -> Response {
        match self {
            SyncOrAsync::Sync(value) => (StatusCode::OK, Json(value)).into_response(),
            SyncOrAsync::Dispatched(task_id) => {
                (StatusCode::ACCEPTED, Json(json!({"task_id": task_id}))).into_response()
            }
        }
    }
}

/// Resolve a stored [`forecast_core::model::PortfolioProject`] per
/// project id; used by handlers that only receive `project_id`s in a
/// request and look the rest up from the portfolio's membership table.
pub fn members_by_id(
    members: Vec<forecast_core::model::PortfolioProject>,
) -> HashMap<ProjectId, forecast_core::model::PortfolioProject> {
    members.into_iter().map(|m| (m.project_id, m)).collect()
}
