//! Portfolio Simulator — composes per-project Monte Carlo trials under a
//! parallel or sequential execution policy, accrues Cost of Delay, and
//! reports critical-path frequency and risk concentration.
//!
//! Joint trials: trial `k` pairs project `i`'s `k`-th BurnDown outcome with
//! every other project's `k`-th outcome, preserving whatever correlation a
//! shared seed induces across projects rather than combining independently
//! computed percentiles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::engine;
use crate::error::{ForecastError, PortfolioError};
use crate::model::{
    ExecutionMode, PortfolioProject, ProjectId, find_dependency_cycle,
};
use crate::model::result::Percentiles;
use crate::util::percentiles::{mean_std, nearest_rank, percentile_set};

/// One project's contribution to a portfolio simulation: its own simulation
/// config plus the membership data (CoD rate, WSJF inputs, dependencies)
/// needed to compose it with the rest of the portfolio.
#[derive(Debug, Clone)]
pub struct ProjectInput {
    pub project_id: ProjectId,
    pub config: SimulationConfig,
    pub member: PortfolioProject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioResult {
    pub execution_mode: ExecutionMode,
    pub portfolio_weeks: Percentiles,
    pub total_cod: Percentiles,
    pub per_project_p85_weeks: HashMap<ProjectId, f64>,
    /// Fraction of joint trials in which each project determined the
    /// portfolio's finish time. `None` in sequential mode (every project is
    /// always on the critical path there, by construction).
    pub critical_path_frequency: Option<HashMap<ProjectId, f64>>,
    pub risk_concentration: HashMap<ProjectId, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompareResult {
    pub parallel: PortfolioResult,
    pub sequential: PortfolioResult,
    pub recommendation: ExecutionMode,
}

/// Per-trial, per-project outcome used internally while composing a joint
/// portfolio trial.
struct ProjectTrials {
    project_id: ProjectId,
    member: PortfolioProject,
    weeks: Vec<f64>,
    p85: f64,
}

/// Collect each project's raw trial outcomes, checking `cancel` between
/// projects — the portfolio simulator's half of the cooperative
/// cancellation contract ("between trials and between per-project
/// sub-simulations in portfolio mode"). `cancel: None` (used by the plain,
/// synchronous entry points and all existing tests) skips the check.
fn collect_trials(
    projects: &[ProjectInput],
    cancel: Option<&AtomicBool>,
) -> Result<Vec<ProjectTrials>, PortfolioError> {
    if projects.is_empty() {
        return Err(PortfolioError::NoProjects);
    }
    let mut out = Vec::with_capacity(projects.len());
    for p in projects {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(PortfolioError::Forecast(ForecastError::Cancelled));
        }
        let outcomes = engine::trials(&p.config)?;
        let mut weeks: Vec<f64> = outcomes.iter().map(|o| o.weeks as f64).collect();
        let mut sorted = weeks.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let p85 = nearest_rank(&sorted, 0.85);
        weeks = outcomes.iter().map(|o| o.weeks as f64).collect();
        out.push(ProjectTrials {
            project_id: p.project_id,
            member: p.member.clone(),
            weeks,
            p85,
        });
    }
    Ok(out)
}

/// Dependency-refined topological order: at each step, among projects whose
/// dependencies are already scheduled, pick the highest-WSJF one (ties by
/// project id). Falls back to a plain WSJF-descending order when no project
/// declares dependencies.
fn topo_order_by_wsjf(trials: &[ProjectTrials]) -> Result<Vec<usize>, PortfolioError> {
    let members: Vec<PortfolioProject> = trials.iter().map(|t| t.member.clone()).collect();
    if let Some(cycle) = find_dependency_cycle(&members) {
        return Err(crate::error::SequencingError::DependencyCycle(cycle).into());
    }

    let wsjf: Vec<f64> = trials
        .iter()
        .map(|t| t.member.wsjf(t.p85).unwrap_or(f64::MIN))
        .collect();

    let mut scheduled = vec![false; trials.len()];
    let mut order = Vec::with_capacity(trials.len());

    while order.len() < trials.len() {
        let mut best: Option<usize> = None;
        for (i, t) in trials.iter().enumerate() {
            if scheduled[i] {
                continue;
            }
            let deps_done = t
                .member
                .dependencies
                .iter()
                .all(|dep| {
                    trials
                        .iter()
                        .position(|other| other.project_id == *dep)
                        .map(|idx| scheduled[idx])
                        .unwrap_or(true)
                });
            if !deps_done {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(b) => {
                    if wsjf[i] > wsjf[b]
                        || (wsjf[i] == wsjf[b] && t.project_id.0 < trials[b].project_id.0)
                    {
                        Some(i)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        let chosen = best.expect("acyclic graph always has an available node");
        scheduled[chosen] = true;
        order.push(chosen);
    }

    Ok(order)
}

fn per_project_p85(trials: &[ProjectTrials]) -> HashMap<ProjectId, f64> {
    trials.iter().map(|t| (t.project_id, t.p85)).collect()
}

fn risk_concentration(trials: &[ProjectTrials], portfolio_weeks: &[f64]) -> HashMap<ProjectId, f64> {
    let (_, portfolio_std) = mean_std(portfolio_weeks);
    let portfolio_var = portfolio_std * portfolio_std;
    trials
        .iter()
        .map(|t| {
            let (_, std) = mean_std(&t.weeks);
            let ratio = if portfolio_var > 0.0 {
                (std * std) / portfolio_var
            } else {
                0.0
            };
            (t.project_id, ratio)
        })
        .collect()
}

/// Run the portfolio under the parallel execution policy: each
/// project's own finish time is shifted by its dependencies' finish times
/// within the same joint trial; the portfolio's duration for that trial is
/// the max finish time across projects.
pub fn simulate_parallel(projects: &[ProjectInput]) -> Result<PortfolioResult, PortfolioError> {
    simulate_parallel_inner(projects, None)
}

/// Same as [`simulate_parallel`] but checked against `cancel` between each
/// project's simulation — used by the Task Runner so a cancelled portfolio
/// task doesn't keep simulating every remaining project.
pub fn simulate_parallel_cancellable(
    projects: &[ProjectInput],
    cancel: &AtomicBool,
) -> Result<PortfolioResult, PortfolioError> {
    simulate_parallel_inner(projects, Some(cancel))
}

fn simulate_parallel_inner(
    projects: &[ProjectInput],
    cancel: Option<&AtomicBool>,
) -> Result<PortfolioResult, PortfolioError> {
    let trials = collect_trials(projects, cancel)?;
    let order = topo_order_by_wsjf(&trials)?;
    let n_trials = trials.iter().map(|t| t.weeks.len()).min().unwrap_or(0);

    let mut portfolio_weeks = Vec::with_capacity(n_trials);
    let mut total_cod = Vec::with_capacity(n_trials);
    let mut critical_hits: HashMap<ProjectId, u64> =
        trials.iter().map(|t| (t.project_id, 0)).collect();

    for k in 0..n_trials {
        let mut finish: HashMap<ProjectId, f64> = HashMap::with_capacity(trials.len());
        let mut max_finish = 0.0_f64;
        let mut max_project = trials[order[0]].project_id;
        let mut cod = 0.0;

        for &idx in &order {
            let t = &trials[idx];
            let start = t
                .member
                .dependencies
                .iter()
                .map(|dep| finish.get(dep).copied().unwrap_or(0.0))
                .fold(0.0_f64, f64::max);
            let duration = t.weeks[k];
            let end = start + duration;
            finish.insert(t.project_id, end);
            cod += t.member.cod_weekly * duration;

            if end > max_finish {
                max_finish = end;
                max_project = t.project_id;
            }
        }

        portfolio_weeks.push(max_finish);
        total_cod.push(cod);
        *critical_hits.get_mut(&max_project).unwrap() += 1;
    }

    let mut portfolio_weeks_sorted = portfolio_weeks.clone();
    portfolio_weeks_sorted.sort_by(|a, b| a.total_cmp(b));
    let mut cod_sorted = total_cod.clone();
    cod_sorted.sort_by(|a, b| a.total_cmp(b));

    let critical_path_frequency = critical_hits
        .into_iter()
        .map(|(id, hits)| (id, hits as f64 / n_trials.max(1) as f64))
        .collect();

    Ok(PortfolioResult {
        execution_mode: ExecutionMode::Parallel,
        portfolio_weeks: percentile_set(&portfolio_weeks_sorted),
        total_cod: percentile_set(&cod_sorted),
        per_project_p85_weeks: per_project_p85(&trials),
        critical_path_frequency: Some(critical_path_frequency),
        risk_concentration: risk_concentration(&trials, &portfolio_weeks),
    })
}

/// Run the portfolio under the sequential execution policy: projects
/// run one after another in dependency-refined WSJF order; each project's
/// Cost of Delay accrues until its own completion, inclusive of every
/// earlier project's duration.
pub fn simulate_sequential(projects: &[ProjectInput]) -> Result<PortfolioResult, PortfolioError> {
    simulate_sequential_inner(projects, None)
}

/// Same as [`simulate_sequential`] but checked against `cancel` between each
/// project's simulation.
pub fn simulate_sequential_cancellable(
    projects: &[ProjectInput],
    cancel: &AtomicBool,
) -> Result<PortfolioResult, PortfolioError> {
    simulate_sequential_inner(projects, Some(cancel))
}

fn simulate_sequential_inner(
    projects: &[ProjectInput],
    cancel: Option<&AtomicBool>,
) -> Result<PortfolioResult, PortfolioError> {
    let trials = collect_trials(projects, cancel)?;
    let order = topo_order_by_wsjf(&trials)?;
    let n_trials = trials.iter().map(|t| t.weeks.len()).min().unwrap_or(0);

    let mut portfolio_weeks = Vec::with_capacity(n_trials);
    let mut total_cod = Vec::with_capacity(n_trials);

    for k in 0..n_trials {
        let mut cumulative = 0.0_f64;
        let mut cod = 0.0_f64;
        for &idx in &order {
            let t = &trials[idx];
            cumulative += t.weeks[k];
            cod += t.member.cod_weekly * cumulative;
        }
        portfolio_weeks.push(cumulative);
        total_cod.push(cod);
    }

    let mut portfolio_weeks_sorted = portfolio_weeks.clone();
    portfolio_weeks_sorted.sort_by(|a, b| a.total_cmp(b));
    let mut cod_sorted = total_cod.clone();
    cod_sorted.sort_by(|a, b| a.total_cmp(b));

    Ok(PortfolioResult {
        execution_mode: ExecutionMode::Sequential,
        portfolio_weeks: percentile_set(&portfolio_weeks_sorted),
        total_cod: percentile_set(&cod_sorted),
        per_project_p85_weeks: per_project_p85(&trials),
        critical_path_frequency: None,
        risk_concentration: risk_concentration(&trials, &portfolio_weeks),
    })
}

/// Run both policies and recommend whichever has the lower P85 portfolio
/// duration, tie-broken by lower total CoD P85.
pub fn compare(projects: &[ProjectInput]) -> Result<CompareResult, PortfolioError> {
    compare_inner(projects, None)
}

/// Same as [`compare`] but checked against `cancel` between each project's
/// simulation, in both the parallel and sequential passes.
pub fn compare_cancellable(
    projects: &[ProjectInput],
    cancel: &AtomicBool,
) -> Result<CompareResult, PortfolioError> {
    compare_inner(projects, Some(cancel))
}

fn compare_inner(
    projects: &[ProjectInput],
    cancel: Option<&AtomicBool>,
) -> Result<CompareResult, PortfolioError> {
    let parallel = simulate_parallel_inner(projects, cancel)?;
    let sequential = simulate_sequential_inner(projects, cancel)?;

    let recommendation = if parallel.portfolio_weeks.p85 < sequential.portfolio_weeks.p85 {
        ExecutionMode::Parallel
    } else if sequential.portfolio_weeks.p85 < parallel.portfolio_weeks.p85 {
        ExecutionMode::Sequential
    } else if parallel.total_cod.p85 <= sequential.total_cod.p85 {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Sequential
    };

    Ok(CompareResult {
        parallel,
        sequential,
        recommendation,
    })
}
