//! Persistence Adapter over SQLite, via `rusqlite`: a single connection
//! behind a mutex. SQLite serializes writers regardless of how many
//! connections a pool hands out, so a single guarded `Connection` gives the
//! same effective throughput as a 5-15 connection pool without the
//! bookkeeping. Each handler checks the mutex out, runs one statement (or a
//! short `transaction()` block) inside it, and releases it: one transaction
//! per use case, no long-running transactions.
//!
//! Only the rows required to survive a restart live here: Projects,
//! Forecasts, Actuals, Portfolios, PortfolioProjects, SimulationRuns. The
//! Task registry is runtime-only (`crate::tasks`).

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};

use forecast_core::config::{SimulationConfig, ThroughputHistory};
use forecast_core::model::result::SimulationResult;
use forecast_core::model::{
    Actual, ExecutionMode, Forecast, ForecastId, ForecastType, Portfolio, PortfolioId,
    PortfolioProject, PortfolioStatus, Project, ProjectId, ProjectStatus, RiskLevel, SimulationRun,
};

use crate::error::{ApiError, ApiResult};

pub type DbConn = Arc<Mutex<Connection>>;

pub fn open(db_url: &str) -> rusqlite::Result<Connection> {
    Connection::open(db_url)
}

/// Cheapest possible liveness probe: a connection that can't even run
/// `SELECT 1` is down, full stop. Used by `GET /health`.
pub fn health_check(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |_| Ok(()))
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            throughput_history TEXT NOT NULL,
            team_size INTEGER NOT NULL,
            status TEXT NOT NULL,
            business_value INTEGER NOT NULL,
            risk_level TEXT NOT NULL,
            capacity_allocated REAL NOT NULL,
            tags TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS forecasts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES projects(id),
            created_at TEXT NOT NULL,
            kind TEXT NOT NULL,
            config_json TEXT NOT NULL,
            result_json TEXT NOT NULL,
            projected_weeks_p85 REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS actuals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            forecast_id INTEGER NOT NULL REFERENCES forecasts(id),
            actual_weeks REAL NOT NULL,
            actual_items INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS portfolios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            total_budget REAL NOT NULL,
            total_capacity REAL NOT NULL,
            status TEXT NOT NULL,
            start_date TEXT NOT NULL,
            target_end_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS portfolio_projects (
            portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
            project_id INTEGER NOT NULL REFERENCES projects(id),
            priority_in_portfolio INTEGER NOT NULL,
            allocation_pct INTEGER NOT NULL,
            cod_weekly REAL NOT NULL,
            business_value REAL NOT NULL,
            time_criticality REAL NOT NULL,
            risk_reduction REAL NOT NULL,
            dependencies TEXT NOT NULL,
            PRIMARY KEY (portfolio_id, project_id)
        );

        CREATE TABLE IF NOT EXISTS simulation_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
            execution_mode TEXT NOT NULL,
            config_json TEXT NOT NULL,
            result_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            runtime_ms INTEGER NOT NULL
        );
        ",
    )
}

fn status_str(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Active => "active",
        ProjectStatus::OnHold => "on_hold",
        ProjectStatus::Completed => "completed",
        ProjectStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> ProjectStatus {
    match s {
        "on_hold" => ProjectStatus::OnHold,
        "completed" => ProjectStatus::Completed,
        "cancelled" => ProjectStatus::Cancelled,
        _ => ProjectStatus::Active,
    }
}

fn risk_str(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
        RiskLevel::Critical => "critical",
    }
}

fn parse_risk(s: &str) -> RiskLevel {
    match s {
        "medium" => RiskLevel::Medium,
        "high" => RiskLevel::High,
        "critical" => RiskLevel::Critical,
        _ => RiskLevel::Low,
    }
}

fn project_from_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    let history_json: String = row.get(2)?;
    let tags_json: String = row.get(8)?;
    Ok(Project {
        id: ProjectId(row.get::<_, i64>(0)? as u32),
        name: row.get(1)?,
        throughput_history: ThroughputHistory::new(
            serde_json::from_str(&history_json).unwrap_or_default(),
        ),
        team_size: row.get::<_, i64>(3)? as u32,
        status: parse_status(&row.get::<_, String>(4)?),
        business_value: row.get::<_, i64>(5)? as u8,
        risk_level: parse_risk(&row.get::<_, String>(6)?),
        capacity_allocated: row.get(7)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
    })
}

pub fn create_project(conn: &Connection, project: &Project) -> ApiResult<ProjectId> {
    conn.execute(
        "INSERT INTO projects (name, throughput_history, team_size, status, business_value, risk_level, capacity_allocated, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            project.name,
            serde_json::to_string(&project.throughput_history.0)?,
            project.team_size,
            status_str(project.status),
            project.business_value as i64,
            risk_str(project.risk_level),
            project.capacity_allocated,
            serde_json::to_string(&project.tags)?,
        ],
    )?;
    Ok(ProjectId(conn.last_insert_rowid() as u32))
}

pub fn get_project(conn: &Connection, id: ProjectId) -> ApiResult<Project> {
    conn.query_row(
        "SELECT id, name, throughput_history, team_size, status, business_value, risk_level, capacity_allocated, tags
         FROM projects WHERE id = ?1",
        params![id.0],
        project_from_row,
    )
    .optional()?
    .ok_or(ApiError::ProjectNotFound(id.0 as i64))
}

pub fn list_projects(conn: &Connection) -> ApiResult<Vec<Project>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, throughput_history, team_size, status, business_value, risk_level, capacity_allocated, tags
         FROM projects ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], project_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_forecast(
    conn: &Connection,
    project_id: ProjectId,
    kind: ForecastType,
    config: &SimulationConfig,
    result: &SimulationResult,
    projected_weeks_p85: f64,
) -> ApiResult<ForecastId> {
    let kind_str = match kind {
        ForecastType::Deadline => "deadline",
        ForecastType::Throughput => "throughput",
        ForecastType::Cost => "cost",
    };
    conn.execute(
        "INSERT INTO forecasts (project_id, created_at, kind, config_json, result_json, projected_weeks_p85)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            project_id.0,
            jiff::Zoned::now().date().to_string(),
            kind_str,
            serde_json::to_string(config)?,
            serde_json::to_string(result)?,
            projected_weeks_p85,
        ],
    )?;
    Ok(ForecastId(conn.last_insert_rowid() as u32))
}

pub fn load_forecast(conn: &Connection, id: ForecastId) -> ApiResult<Forecast> {
    conn.query_row(
        "SELECT id, project_id, created_at, kind, config_json, result_json, projected_weeks_p85
         FROM forecasts WHERE id = ?1",
        params![id.0],
        forecast_from_row,
    )
    .optional()?
    .ok_or(ApiError::ForecastNotFound(id.0 as i64))
}

pub fn list_forecasts(conn: &Connection, project_id: ProjectId) -> ApiResult<Vec<Forecast>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, created_at, kind, config_json, result_json, projected_weeks_p85
         FROM forecasts WHERE project_id = ?1 ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map(params![project_id.0], forecast_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn forecast_from_row(row: &rusqlite::Row) -> rusqlite::Result<Forecast> {
    let kind_str: String = row.get(3)?;
    let config_json: String = row.get(4)?;
    let result_json: String = row.get(5)?;
    let created_at: String = row.get(2)?;
    Ok(Forecast {
        id: ForecastId(row.get::<_, i64>(0)? as u32),
        project_id: ProjectId(row.get::<_, i64>(1)? as u32),
        created_at: created_at
            .parse::<jiff::civil::Date>()
            .unwrap_or(jiff::civil::date(1970, 1, 1)),
        kind: match kind_str.as_str() {
            "throughput" => ForecastType::Throughput,
            "cost" => ForecastType::Cost,
            _ => ForecastType::Deadline,
        },
        config: serde_json::from_str(&config_json)
            .map_err(|_| rusqlite::Error::InvalidColumnType(4, "config_json".into(), rusqlite::types::Type::Text))?,
        result: serde_json::from_str(&result_json)
            .map_err(|_| rusqlite::Error::InvalidColumnType(5, "result_json".into(), rusqlite::types::Type::Text))?,
        projected_weeks_p85: row.get(6)?,
    })
}

pub fn record_actual(conn: &Connection, actual: &Actual) -> ApiResult<()> {
    conn.execute(
        "INSERT INTO actuals (forecast_id, actual_weeks, actual_items, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            actual.forecast_id.0,
            actual.actual_weeks,
            actual.actual_items,
            actual.recorded_at.to_string(),
        ],
    )?;
    Ok(())
}

/// Forecast/actual pairs for a project, used by
/// `forecast_core::model::compute_accuracy`.
pub fn forecast_actual_pairs(conn: &Connection, project_id: ProjectId) -> ApiResult<Vec<(f64, Actual)>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.forecast_id, a.actual_weeks, a.actual_items, a.recorded_at, f.projected_weeks_p85
         FROM actuals a JOIN forecasts f ON f.id = a.forecast_id
         WHERE f.project_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![project_id.0], |row| {
            let recorded_at: String = row.get(4)?;
            let projected_p85: f64 = row.get(5)?;
            let actual = Actual {
                id: row.get::<_, i64>(0)? as u32,
                forecast_id: ForecastId(row.get::<_, i64>(1)? as u32),
                actual_weeks: row.get(2)?,
                actual_items: row.get::<_, i64>(3)? as u64,
                recorded_at: recorded_at
                    .parse::<jiff::civil::Date>()
                    .unwrap_or(jiff::civil::date(1970, 1, 1)),
            };
            Ok((projected_p85, actual))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_portfolio(conn: &Connection, portfolio: &Portfolio) -> ApiResult<PortfolioId> {
    let status_str = match portfolio.status {
        PortfolioStatus::Active => "active",
        PortfolioStatus::OnHold => "on_hold",
        PortfolioStatus::Completed => "completed",
        PortfolioStatus::Cancelled => "cancelled",
    };
    conn.execute(
        "INSERT INTO portfolios (name, total_budget, total_capacity, status, start_date, target_end_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            portfolio.name,
            portfolio.total_budget,
            portfolio.total_capacity,
            status_str,
            portfolio.start_date.to_string(),
            portfolio.target_end_date.to_string(),
        ],
    )?;
    Ok(PortfolioId(conn.last_insert_rowid() as u32))
}

pub fn get_portfolio(conn: &Connection, id: PortfolioId) -> ApiResult<Portfolio> {
    conn.query_row(
        "SELECT id, name, total_budget, total_capacity, status, start_date, target_end_date
         FROM portfolios WHERE id = ?1",
        params![id.0],
        portfolio_from_row,
    )
    .optional()?
    .ok_or(ApiError::PortfolioNotFound(id.0 as i64))
}

pub fn list_portfolios(conn: &Connection) -> ApiResult<Vec<Portfolio>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, total_budget, total_capacity, status, start_date, target_end_date
         FROM portfolios ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], portfolio_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn portfolio_from_row(row: &rusqlite::Row) -> rusqlite::Result<Portfolio> {
    let status: String = row.get(4)?;
    let start: String = row.get(5)?;
    let end: String = row.get(6)?;
    Ok(Portfolio {
        id: PortfolioId(row.get::<_, i64>(0)? as u32),
        name: row.get(1)?,
        total_budget: row.get(2)?,
        total_capacity: row.get(3)?,
        status: match status.as_str() {
            "on_hold" => PortfolioStatus::OnHold,
            "completed" => PortfolioStatus::Completed,
            "cancelled" => PortfolioStatus::Cancelled,
            _ => PortfolioStatus::Active,
        },
        start_date: start.parse().unwrap_or(jiff::civil::date(1970, 1, 1)),
        target_end_date: end.parse().unwrap_or(jiff::civil::date(1970, 1, 1)),
    })
}

/// Upsert a `(portfolio_id, project_id)` membership row (
/// "writes use upsert semantics on that key"). Rejects a dependency edge
/// that would create a cycle among the portfolio's current memberships
/// before writing (dependency graph is acyclic; enforced on
/// every insert/update").
pub fn add_project_to_portfolio(conn: &Connection, member: &PortfolioProject) -> ApiResult<()> {
    let mut existing = list_portfolio_projects(conn, member.portfolio_id)?;
    existing.retain(|m| m.project_id != member.project_id);
    existing.push(member.clone());
    if forecast_core::model::find_dependency_cycle(&existing).is_some() {
        return Err(ApiError::DependencyCycle);
    }

    let deps_json = serde_json::to_string(&member.dependencies.iter().map(|p| p.0).collect::<Vec<_>>())?;
    conn.execute(
        "INSERT INTO portfolio_projects (portfolio_id, project_id, priority_in_portfolio, allocation_pct, cod_weekly, business_value, time_criticality, risk_reduction, dependencies)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(portfolio_id, project_id) DO UPDATE SET
            priority_in_portfolio = excluded.priority_in_portfolio,
            allocation_pct = excluded.allocation_pct,
            cod_weekly = excluded.cod_weekly,
            business_value = excluded.business_value,
            time_criticality = excluded.time_criticality,
            risk_reduction = excluded.risk_reduction,
            dependencies = excluded.dependencies",
        params![
            member.portfolio_id.0,
            member.project_id.0,
            member.priority_in_portfolio,
            member.allocation_pct,
            member.cod_weekly,
            member.business_value,
            member.time_criticality,
            member.risk_reduction,
            deps_json,
        ],
    )?;
    Ok(())
}

pub fn list_portfolio_projects(conn: &Connection, portfolio_id: PortfolioId) -> ApiResult<Vec<PortfolioProject>> {
    let mut stmt = conn.prepare(
        "SELECT portfolio_id, project_id, priority_in_portfolio, allocation_pct, cod_weekly, business_value, time_criticality, risk_reduction, dependencies
         FROM portfolio_projects WHERE portfolio_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![portfolio_id.0], |row| {
            let deps_json: String = row.get(8)?;
            let dep_ids: Vec<u32> = serde_json::from_str(&deps_json).unwrap_or_default();
            Ok(PortfolioProject {
                portfolio_id: PortfolioId(row.get::<_, i64>(0)? as u32),
                project_id: ProjectId(row.get::<_, i64>(1)? as u32),
                priority_in_portfolio: row.get::<_, i64>(2)? as u8,
                allocation_pct: row.get::<_, i64>(3)? as u8,
                cod_weekly: row.get(4)?,
                business_value: row.get(5)?,
                time_criticality: row.get(6)?,
                risk_reduction: row.get(7)?,
                dependencies: dep_ids.into_iter().map(ProjectId).collect(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_simulation_run(
    conn: &Connection,
    portfolio_id: PortfolioId,
    mode: ExecutionMode,
    config_json: &str,
    result_json: &str,
    runtime_ms: u64,
) -> ApiResult<SimulationRun> {
    let mode_str = match mode {
        ExecutionMode::Parallel => "parallel",
        ExecutionMode::Sequential => "sequential",
        ExecutionMode::Compare => "compare",
    };
    let created_at = jiff::Zoned::now().date();
    conn.execute(
        "INSERT INTO simulation_runs (portfolio_id, execution_mode, config_json, result_json, created_at, runtime_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![portfolio_id.0, mode_str, config_json, result_json, created_at.to_string(), runtime_ms],
    )?;
    Ok(SimulationRun {
        id: conn.last_insert_rowid() as u32,
        portfolio_id,
        execution_mode: mode,
        created_at,
        runtime_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_core::config::ThroughputHistory;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample_project() -> Project {
        Project {
            id: ProjectId(0),
            name: "Checkout Revamp".to_string(),
            throughput_history: ThroughputHistory::new(vec![5.0, 6.0, 7.0]),
            team_size: 5,
            status: ProjectStatus::Active,
            business_value: 80,
            risk_level: RiskLevel::Medium,
            capacity_allocated: 2.5,
            tags: vec!["checkout".to_string()],
        }
    }

    #[test]
    fn round_trips_a_project() {
        let conn = memory_db();
        let id = create_project(&conn, &sample_project()).unwrap();
        let loaded = get_project(&conn, id).unwrap();
        assert_eq!(loaded.name, "Checkout Revamp");
        assert_eq!(loaded.risk_level, RiskLevel::Medium);
        assert_eq!(loaded.throughput_history.0, vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn missing_project_is_not_found() {
        let conn = memory_db();
        assert!(matches!(get_project(&conn, ProjectId(999)), Err(ApiError::ProjectNotFound(_))));
    }

    #[test]
    fn portfolio_project_upsert_rejects_cycles() {
        let conn = memory_db();
        let portfolio_id = create_portfolio(
            &conn,
            &Portfolio {
                id: PortfolioId(0),
                name: "Q4".to_string(),
                total_budget: 1_000_000.0,
                total_capacity: 20.0,
                status: PortfolioStatus::Active,
                start_date: jiff::civil::date(2025, 1, 1),
                target_end_date: jiff::civil::date(2025, 12, 31),
            },
        )
        .unwrap();

        let member = |project_id: u32, deps: Vec<u32>| PortfolioProject {
            portfolio_id,
            project_id: ProjectId(project_id),
            priority_in_portfolio: 1,
            allocation_pct: 100,
            cod_weekly: 1000.0,
            business_value: 50.0,
            time_criticality: 50.0,
            risk_reduction: 0.0,
            dependencies: deps.into_iter().map(ProjectId).collect(),
        };

        add_project_to_portfolio(&conn, &member(1, vec![])).unwrap();
        add_project_to_portfolio(&conn, &member(2, vec![1])).unwrap();
        let cyclic = add_project_to_portfolio(&conn, &member(1, vec![2]));
        assert!(matches!(cyclic, Err(ApiError::DependencyCycle)));

        let members = list_portfolio_projects(&conn, portfolio_id).unwrap();
        assert_eq!(members.len(), 2);
    }
}
