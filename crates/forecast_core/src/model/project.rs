//! Persistent entities: projects, forecasts, actuals, portfolios.
//!
//! These are plain data types — the persisted entities stripped of any
//! persistence-layer concern. `forecast_server` maps them to/from SQLite
//! rows; nothing here knows about storage.

use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{ForecastId, PortfolioId, ProjectId};
use crate::config::{SimulationConfig, ThroughputHistory};
use crate::model::result::SimulationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    OnHold,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Numeric mapping used by the selection optimizer's risk objective
    /// `{low=1, medium=2, high=3, critical=4}`, scaled by 25.
    pub fn score(self) -> f64 {
        let base = match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 2.0,
            RiskLevel::High => 3.0,
            RiskLevel::Critical => 4.0,
        };
        base * 25.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub throughput_history: ThroughputHistory,
    pub team_size: u32,
    pub status: ProjectStatus,
    /// 0..=100
    pub business_value: u8,
    pub risk_level: RiskLevel,
    pub capacity_allocated: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastType {
    Deadline,
    Throughput,
    Cost,
}

/// A persisted (config, result) pair, tied to a project. Immutable once saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub id: ForecastId,
    pub project_id: ProjectId,
    pub created_at: Date,
    pub kind: ForecastType,
    pub config: SimulationConfig,
    pub result: SimulationResult,
    pub projected_weeks_p85: f64,
}

/// Observed outcome for a finished project, used for backtesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actual {
    pub id: u32,
    pub forecast_id: ForecastId,
    pub actual_weeks: f64,
    pub actual_items: u64,
    pub recorded_at: Date,
}

impl Actual {
    pub fn error_weeks(&self, projected_weeks_p85: f64) -> f64 {
        self.actual_weeks - projected_weeks_p85
    }

    pub fn error_pct(&self, projected_weeks_p85: f64) -> f64 {
        if projected_weeks_p85 == 0.0 {
            0.0
        } else {
            self.error_weeks(projected_weeks_p85) / projected_weeks_p85 * 100.0
        }
    }
}

/// Forecast accuracy, aggregated over a project's (forecast, actual) pairs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AccuracyStats {
    /// Mean Absolute Percentage Error.
    pub mape: f64,
    /// Mean Absolute Error (weeks).
    pub mae: f64,
    /// Signed mean error (weeks) — positive means actuals ran long.
    pub bias: f64,
    pub n: usize,
}

pub fn compute_accuracy(pairs: &[(f64, Actual)]) -> AccuracyStats {
    if pairs.is_empty() {
        return AccuracyStats::default();
    }
    let n = pairs.len();
    let mut abs_pct_sum = 0.0;
    let mut abs_err_sum = 0.0;
    let mut signed_err_sum = 0.0;
    for (projected_p85, actual) in pairs {
        let err = actual.error_weeks(*projected_p85);
        abs_err_sum += err.abs();
        signed_err_sum += err;
        if *projected_p85 != 0.0 {
            abs_pct_sum += (err / projected_p85).abs() * 100.0;
        }
    }
    AccuracyStats {
        mape: abs_pct_sum / n as f64,
        mae: abs_err_sum / n as f64,
        bias: signed_err_sum / n as f64,
        n,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioStatus {
    Active,
    OnHold,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub name: String,
    pub total_budget: f64,
    pub total_capacity: f64,
    pub status: PortfolioStatus,
    pub start_date: Date,
    pub target_end_date: Date,
}

/// N:N membership row between a [`Portfolio`] and a [`Project`], carrying
/// per-membership priority, allocation, CoD/value scoring, and dependency
/// edges within the same portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioProject {
    pub portfolio_id: PortfolioId,
    pub project_id: ProjectId,
    /// 1..=5
    pub priority_in_portfolio: u8,
    /// 0..=100
    pub allocation_pct: u8,
    /// Currency per week of delay.
    pub cod_weekly: f64,
    /// 0..=100
    pub business_value: f64,
    /// 0..=100
    pub time_criticality: f64,
    /// 0..=100
    pub risk_reduction: f64,
    pub dependencies: BTreeSet<ProjectId>,
}

impl PortfolioProject {
    /// WSJF = (BV + TC + RR) / D, D = P85 duration in weeks.
    ///
    /// Returns `None` when `duration_p85_weeks <= 0`, matching the
    /// "projects with D_i = 0 are filtered out" rule — callers filter on
    /// `None` rather than dividing by zero.
    pub fn wsjf(&self, duration_p85_weeks: f64) -> Option<f64> {
        if duration_p85_weeks <= 0.0 {
            None
        } else {
            Some(
                (self.business_value + self.time_criticality + self.risk_reduction)
                    / duration_p85_weeks,
            )
        }
    }
}

/// Detects a dependency cycle among a set of portfolio memberships via DFS.
/// Returns the cycle's project ids if one exists.
pub fn find_dependency_cycle(members: &[PortfolioProject]) -> Option<Vec<ProjectId>> {
    use std::collections::HashMap;

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let edges: HashMap<ProjectId, &BTreeSet<ProjectId>> = members
        .iter()
        .map(|m| (m.project_id, &m.dependencies))
        .collect();

    let mut marks: HashMap<ProjectId, Mark> = HashMap::new();

    fn visit(
        node: ProjectId,
        edges: &HashMap<ProjectId, &BTreeSet<ProjectId>>,
        marks: &mut HashMap<ProjectId, Mark>,
        stack: &mut Vec<ProjectId>,
    ) -> Option<Vec<ProjectId>> {
        match marks.get(&node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|&p| p == node).unwrap_or(0);
                return Some(stack[start..].to_vec());
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        if let Some(deps) = edges.get(&node) {
            for &dep in deps.iter() {
                if let Some(cycle) = visit(dep, edges, marks, stack) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    for &project_id in edges.keys() {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(project_id, &edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
    Compare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRun {
    pub id: u32,
    pub portfolio_id: PortfolioId,
    pub execution_mode: ExecutionMode,
    pub created_at: Date,
    pub runtime_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pp(id: u32, deps: &[u32]) -> PortfolioProject {
        PortfolioProject {
            portfolio_id: PortfolioId(1),
            project_id: ProjectId(id),
            priority_in_portfolio: 1,
            allocation_pct: 100,
            cod_weekly: 1000.0,
            business_value: 50.0,
            time_criticality: 50.0,
            risk_reduction: 0.0,
            dependencies: deps.iter().map(|&d| ProjectId(d)).collect(),
        }
    }

    #[test]
    fn acyclic_dependencies_pass() {
        let members = vec![pp(1, &[]), pp(2, &[1]), pp(3, &[1, 2])];
        assert!(find_dependency_cycle(&members).is_none());
    }

    #[test]
    fn cyclic_dependencies_detected() {
        let members = vec![pp(1, &[2]), pp(2, &[3]), pp(3, &[1])];
        assert!(find_dependency_cycle(&members).is_some());
    }

    #[test]
    fn wsjf_filters_zero_duration() {
        let p = pp(1, &[]);
        assert!(p.wsjf(0.0).is_none());
        assert!(p.wsjf(-1.0).is_none());
        assert_eq!(p.wsjf(10.0), Some(10.0));
    }

    #[test]
    fn risk_level_scores_scale_by_25() {
        assert_eq!(RiskLevel::Low.score(), 25.0);
        assert_eq!(RiskLevel::Critical.score(), 100.0);
    }
}
