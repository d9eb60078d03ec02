//! Selection Optimizer — binary MILP over candidate projects, solved by a
//! hand-rolled branch-and-bound search rather than an external LP/MILP
//! crate, in keeping with this codebase's practice of hand-rolling its own
//! optimization algorithms (see `binary_search`/`grid_search`-style modules
//! elsewhere in this tree) instead of reaching for a solver dependency.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, SolveStatus};
use crate::model::ProjectId;

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    MaximizeValue,
    MaximizeWsjf,
    MinimizeRisk,
    MaximizeValuePerRisk,
}

/// One candidate project, reduced to the numbers the optimizer needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub project_id: ProjectId,
    pub budget: f64,
    pub capacity: f64,
    pub business_value: f64,
    pub wsjf: f64,
    pub risk_score: f64,
}

impl Candidate {
    fn objective_coef(&self, objective: Objective) -> f64 {
        match objective {
            Objective::MaximizeValue => self.business_value,
            Objective::MaximizeWsjf => self.wsjf,
            Objective::MinimizeRisk => -self.risk_score,
            Objective::MaximizeValuePerRisk => self.business_value / self.risk_score.max(1.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub max_budget: f64,
    pub max_capacity: f64,
    pub min_business_value: Option<f64>,
    pub max_risk_score: Option<f64>,
    pub mandatory: BTreeSet<ProjectId>,
    pub excluded: BTreeSet<ProjectId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolveResult {
    pub selected_ids: Vec<ProjectId>,
    pub objective_value: f64,
    pub status: SolveStatus,
    pub budget_utilization_pct: f64,
    pub capacity_utilization_pct: f64,
    pub recommendations: Vec<String>,
}

/// Solve the selection problem within [`DEFAULT_TIME_LIMIT`]; on timeout,
/// returns the best feasible solution found so far with `status:
/// TimeLimit` rather than failing.
pub fn solve(
    candidates: &[Candidate],
    objective: Objective,
    constraints: &Constraints,
) -> Result<SolveResult, OptimizeError> {
    solve_with_time_limit(candidates, objective, constraints, DEFAULT_TIME_LIMIT)
}

/// Same as [`solve`] but with a caller-supplied wall-clock budget — the
/// server plumbs `MILP_TIME_LIMIT_SECONDS` through here instead of
/// hard-coding [`DEFAULT_TIME_LIMIT`].
pub fn solve_with_time_limit(
    candidates: &[Candidate],
    objective: Objective,
    constraints: &Constraints,
    time_limit: Duration,
) -> Result<SolveResult, OptimizeError> {
    if candidates.is_empty() {
        return Err(OptimizeError::NoCandidates);
    }

    if let Some(reason) = infeasible_from_mandatory_alone(candidates, constraints) {
        return Err(OptimizeError::Infeasible {
            binding_constraint: reason,
        });
    }

    let free: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            !constraints.mandatory.contains(&c.project_id)
                && !constraints.excluded.contains(&c.project_id)
        })
        .collect();

    // Density ordering used only for the bounding heuristic below; doesn't
    // affect correctness, only how quickly infeasible branches get pruned.
    let mut by_density: Vec<&Candidate> = free.clone();
    by_density.sort_by(|a, b| {
        let da = a.objective_coef(objective) / a.budget.max(1e-9);
        let db = b.objective_coef(objective) / b.budget.max(1e-9);
        db.total_cmp(&da)
    });

    let mandatory_value: f64 = candidates
        .iter()
        .filter(|c| constraints.mandatory.contains(&c.project_id))
        .map(|c| c.objective_coef(objective))
        .sum();
    let mandatory_budget: f64 = candidates
        .iter()
        .filter(|c| constraints.mandatory.contains(&c.project_id))
        .map(|c| c.budget)
        .sum();
    let mandatory_capacity: f64 = candidates
        .iter()
        .filter(|c| constraints.mandatory.contains(&c.project_id))
        .map(|c| c.capacity)
        .sum();
    let mandatory_bv: f64 = candidates
        .iter()
        .filter(|c| constraints.mandatory.contains(&c.project_id))
        .map(|c| c.business_value)
        .sum();
    let mandatory_risk: f64 = candidates
        .iter()
        .filter(|c| constraints.mandatory.contains(&c.project_id))
        .map(|c| c.risk_score)
        .sum();

    let deadline = Instant::now() + time_limit;
    let mut search = Search {
        objective,
        constraints,
        by_density: &by_density,
        deadline,
        timed_out: false,
        best_value: f64::NEG_INFINITY,
        best_selection: BTreeSet::new(),
    };

    let mandatory_ids: BTreeSet<ProjectId> = constraints.mandatory.clone();
    search.branch(
        0,
        mandatory_ids,
        mandatory_value,
        mandatory_budget,
        mandatory_capacity,
        mandatory_bv,
        mandatory_risk,
    );

    if !search.best_selection_is_feasible() {
        return Err(OptimizeError::Infeasible {
            binding_constraint: "no feasible combination of candidates satisfies all constraints"
                .to_string(),
        });
    }

    let selected_ids: Vec<ProjectId> = candidates
        .iter()
        .map(|c| c.project_id)
        .filter(|id| search.best_selection.contains(id))
        .collect();

    let used_budget: f64 = candidates
        .iter()
        .filter(|c| search.best_selection.contains(&c.project_id))
        .map(|c| c.budget)
        .sum();
    let used_capacity: f64 = candidates
        .iter()
        .filter(|c| search.best_selection.contains(&c.project_id))
        .map(|c| c.capacity)
        .sum();

    let budget_utilization_pct = if constraints.max_budget > 0.0 {
        100.0 * used_budget / constraints.max_budget
    } else {
        0.0
    };
    let capacity_utilization_pct = if constraints.max_capacity > 0.0 {
        100.0 * used_capacity / constraints.max_capacity
    } else {
        0.0
    };

    let status = if search.timed_out {
        SolveStatus::TimeLimit
    } else {
        SolveStatus::Optimal
    };

    let recommendations =
        recommend(candidates, constraints, &selected_ids, budget_utilization_pct, capacity_utilization_pct);

    Ok(SolveResult {
        selected_ids,
        objective_value: search.best_value,
        status,
        budget_utilization_pct,
        capacity_utilization_pct,
        recommendations,
    })
}

fn infeasible_from_mandatory_alone(candidates: &[Candidate], constraints: &Constraints) -> Option<String> {
    let mandatory: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| constraints.mandatory.contains(&c.project_id))
        .collect();
    if mandatory.iter().any(|c| constraints.excluded.contains(&c.project_id)) {
        return Some("a project is both mandatory and excluded".to_string());
    }
    let budget: f64 = mandatory.iter().map(|c| c.budget).sum();
    if budget > constraints.max_budget {
        return Some(format!(
            "mandatory projects alone require budget {budget:.2} > max_budget {:.2}",
            constraints.max_budget
        ));
    }
    let capacity: f64 = mandatory.iter().map(|c| c.capacity).sum();
    if capacity > constraints.max_capacity {
        return Some(format!(
            "mandatory projects alone require capacity {capacity:.2} > max_capacity {:.2}",
            constraints.max_capacity
        ));
    }
    if let Some(max_risk) = constraints.max_risk_score {
        let risk: f64 = mandatory.iter().map(|c| c.risk_score).sum();
        if risk > max_risk {
            return Some(format!(
                "mandatory projects alone accumulate risk {risk:.2} > max_risk_score {max_risk:.2}"
            ));
        }
    }
    None
}

struct Search<'a> {
    objective: Objective,
    constraints: &'a Constraints,
    by_density: &'a [&'a Candidate],
    deadline: Instant,
    timed_out: bool,
    best_value: f64,
    best_selection: BTreeSet<ProjectId>,
}

impl<'a> Search<'a> {
    fn best_selection_is_feasible(&self) -> bool {
        self.best_value.is_finite()
    }

    /// Fractional-relaxation upper bound on the best achievable objective
    /// from `index` onward, ignoring every constraint but budget — a valid
    /// (if loose) upper bound, since tightening any other constraint can
    /// only lower the true optimum.
    fn bound(&self, index: usize, current_value: f64, budget_left: f64) -> f64 {
        let mut value = current_value;
        let mut budget = budget_left;
        for c in &self.by_density[index..] {
            if constraints_exclude(self.constraints, c.project_id) {
                continue;
            }
            if c.budget <= budget {
                budget -= c.budget;
                value += c.objective_coef(self.objective);
            } else if budget > 0.0 {
                value += c.objective_coef(self.objective) * (budget / c.budget);
                break;
            } else {
                break;
            }
        }
        value
    }

    #[allow(clippy::too_many_arguments)]
    fn branch(
        &mut self,
        index: usize,
        selection: BTreeSet<ProjectId>,
        value: f64,
        budget_used: f64,
        capacity_used: f64,
        business_value: f64,
        risk_used: f64,
    ) {
        if Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        if self.timed_out {
            self.consider_leaf(&selection, value, business_value, risk_used);
            return;
        }

        if index >= self.by_density.len() {
            self.consider_leaf(&selection, value, business_value, risk_used);
            return;
        }

        let budget_left = self.constraints.max_budget - budget_used;
        if self.bound(index, value, budget_left.max(0.0)) <= self.best_value {
            self.consider_leaf(&selection, value, business_value, risk_used);
            return;
        }

        let c = self.by_density[index];
        if constraints_exclude(self.constraints, c.project_id) {
            self.branch(index + 1, selection, value, budget_used, capacity_used, business_value, risk_used);
            return;
        }

        // Branch: include c.
        if budget_used + c.budget <= self.constraints.max_budget
            && capacity_used + c.capacity <= self.constraints.max_capacity
        {
            let mut with_c = selection.clone();
            with_c.insert(c.project_id);
            self.branch(
                index + 1,
                with_c,
                value + c.objective_coef(self.objective),
                budget_used + c.budget,
                capacity_used + c.capacity,
                business_value + c.business_value,
                risk_used + c.risk_score,
            );
        }

        // Branch: exclude c.
        self.branch(index + 1, selection, value, budget_used, capacity_used, business_value, risk_used);
    }

    fn consider_leaf(&mut self, selection: &BTreeSet<ProjectId>, value: f64, business_value: f64, risk_used: f64) {
        if let Some(min_bv) = self.constraints.min_business_value {
            if business_value < min_bv {
                return;
            }
        }
        if let Some(max_risk) = self.constraints.max_risk_score {
            if risk_used > max_risk {
                return;
            }
        }
        if value > self.best_value {
            self.best_value = value;
            self.best_selection = selection.clone();
        }
    }
}

fn constraints_exclude(constraints: &Constraints, id: ProjectId) -> bool {
    constraints.excluded.contains(&id)
}

fn recommend(
    candidates: &[Candidate],
    constraints: &Constraints,
    selected_ids: &[ProjectId],
    budget_utilization_pct: f64,
    capacity_utilization_pct: f64,
) -> Vec<String> {
    let mut out = Vec::new();
    if budget_utilization_pct > 95.0 {
        out.push("budget utilization exceeds 95% — consider raising max_budget".to_string());
    }
    if capacity_utilization_pct > 95.0 {
        out.push("capacity utilization exceeds 95% — consider raising max_capacity".to_string());
    }

    let selected: BTreeSet<ProjectId> = selected_ids.iter().copied().collect();
    if let Some(best_rejected) = candidates
        .iter()
        .filter(|c| !selected.contains(&c.project_id) && !constraints.excluded.contains(&c.project_id))
        .max_by(|a, b| a.business_value.total_cmp(&b.business_value))
    {
        let mut bvs: Vec<f64> = candidates.iter().map(|c| c.business_value).collect();
        bvs.sort_by(|a, b| a.total_cmp(b));
        let q3 = crate::util::percentiles::nearest_rank(&bvs, 0.75);
        if best_rejected.business_value >= q3 {
            out.push(format!(
                "project {} has high business value ({:.1}) but was not selected — consider relaxing constraints",
                best_rejected.project_id.0, best_rejected.business_value
            ));
        }
    }

    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioResult {
    pub label: String,
    pub result: SolveResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioComparison {
    pub scenarios: Vec<ScenarioResult>,
    pub best_scenario: String,
    pub differing_project_ids: Vec<ProjectId>,
}

/// Solve the same candidate set under several named constraint sets and
/// report which projects differ across the resulting selections.
pub fn compare_scenarios(
    candidates: &[Candidate],
    objective: Objective,
    scenarios: &[(String, Constraints)],
) -> Result<ScenarioComparison, OptimizeError> {
    let mut results = Vec::with_capacity(scenarios.len());
    for (label, constraints) in scenarios {
        results.push(ScenarioResult {
            label: label.clone(),
            result: solve(candidates, objective, constraints)?,
        });
    }

    let best = results
        .iter()
        .max_by(|a, b| a.result.objective_value.total_cmp(&b.result.objective_value))
        .map(|r| r.label.clone())
        .unwrap_or_default();

    let mut all_selected: BTreeSet<ProjectId> = BTreeSet::new();
    let mut selection_counts: std::collections::HashMap<ProjectId, usize> = std::collections::HashMap::new();
    for r in &results {
        for id in &r.result.selected_ids {
            all_selected.insert(*id);
            *selection_counts.entry(*id).or_insert(0) += 1;
        }
    }
    let differing_project_ids: Vec<ProjectId> = all_selected
        .into_iter()
        .filter(|id| selection_counts.get(id).copied().unwrap_or(0) != results.len())
        .collect();

    Ok(ScenarioComparison {
        scenarios: results,
        best_scenario: best,
        differing_project_ids,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParetoPoint {
    pub max_budget: f64,
    pub objective_value: f64,
}

/// Sweep `max_budget` across `k` evenly spaced values between the cheapest
/// single candidate and `base.max_budget`, solving at each point.
pub fn pareto_frontier(
    candidates: &[Candidate],
    objective: Objective,
    base: &Constraints,
    k: usize,
) -> Result<Vec<ParetoPoint>, OptimizeError> {
    if candidates.is_empty() {
        return Err(OptimizeError::NoCandidates);
    }
    let min_budget = candidates
        .iter()
        .map(|c| c.budget)
        .fold(f64::INFINITY, f64::min);
    let k = k.max(2);

    let mut points = Vec::with_capacity(k);
    for i in 0..k {
        let frac = i as f64 / (k - 1) as f64;
        let budget = min_budget + (base.max_budget - min_budget) * frac;
        let mut constraints = base.clone();
        constraints.max_budget = budget;
        let objective_value = match solve(candidates, objective, &constraints) {
            Ok(result) => result.objective_value,
            Err(_) => 0.0,
        };
        points.push(ParetoPoint {
            max_budget: budget,
            objective_value,
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, budget: f64, capacity: f64, bv: f64, wsjf: f64, risk: f64) -> Candidate {
        Candidate {
            project_id: ProjectId(id),
            budget,
            capacity,
            business_value: bv,
            wsjf,
            risk_score: risk,
        }
    }

    #[test]
    fn respects_mandatory_and_excluded() {
        let candidates = vec![
            candidate(1, 100_000.0, 3.0, 80.0, 10.0, 25.0),
            candidate(2, 150_000.0, 4.0, 90.0, 12.0, 50.0),
            candidate(3, 120_000.0, 2.0, 60.0, 8.0, 25.0),
            candidate(4, 90_000.0, 3.0, 70.0, 9.0, 75.0),
        ];
        let mut constraints = Constraints {
            max_budget: 500_000.0,
            max_capacity: 12.0,
            ..Default::default()
        };
        constraints.mandatory.insert(ProjectId(1));
        constraints.excluded.insert(ProjectId(4));

        let result = solve(&candidates, Objective::MaximizeValue, &constraints).unwrap();
        assert!(result.selected_ids.contains(&ProjectId(1)));
        assert!(!result.selected_ids.contains(&ProjectId(4)));
    }

    #[test]
    fn budget_feasibility_holds_at_optimum() {
        let candidates = vec![
            candidate(1, 100_000.0, 3.0, 80.0, 10.0, 25.0),
            candidate(2, 150_000.0, 4.0, 90.0, 12.0, 50.0),
            candidate(3, 120_000.0, 2.0, 60.0, 8.0, 25.0),
        ];
        let constraints = Constraints {
            max_budget: 250_000.0,
            max_capacity: 12.0,
            ..Default::default()
        };
        let result = solve(&candidates, Objective::MaximizeValue, &constraints).unwrap();
        let used: f64 = candidates
            .iter()
            .filter(|c| result.selected_ids.contains(&c.project_id))
            .map(|c| c.budget)
            .sum();
        assert!(used <= constraints.max_budget + 1e-9);
    }

    #[test]
    fn mandatory_over_budget_is_infeasible() {
        let candidates = vec![candidate(1, 1_000_000.0, 3.0, 80.0, 10.0, 25.0)];
        let mut constraints = Constraints {
            max_budget: 500_000.0,
            max_capacity: 12.0,
            ..Default::default()
        };
        constraints.mandatory.insert(ProjectId(1));
        assert!(matches!(
            solve(&candidates, Objective::MaximizeValue, &constraints),
            Err(OptimizeError::Infeasible { .. })
        ));
    }

    #[test]
    fn mandatory_projects_are_always_included() {
        let mut candidates = Vec::new();
        for i in 1..=10u32 {
            candidates.push(candidate(
                i,
                20_000.0 * i as f64,
                1.0 + i as f64 * 0.3,
                (i as f64 * 7.0) % 100.0 + 10.0,
                (i as f64 * 3.0) % 20.0 + 1.0,
                25.0 * ((i % 4) + 1) as f64,
            ));
        }
        let mut constraints = Constraints {
            max_budget: 500_000.0,
            max_capacity: 12.0,
            ..Default::default()
        };
        constraints.mandatory.insert(ProjectId(1));
        constraints.mandatory.insert(ProjectId(5));

        let result = solve(&candidates, Objective::MaximizeValue, &constraints).unwrap();
        assert!(result.selected_ids.contains(&ProjectId(1)));
        assert!(result.selected_ids.contains(&ProjectId(5)));
        let used_budget: f64 = candidates
            .iter()
            .filter(|c| result.selected_ids.contains(&c.project_id))
            .map(|c| c.budget)
            .sum();
        assert!(used_budget <= 500_000.0 + 1e-9);
    }

    #[test]
    fn no_candidates_is_an_error() {
        let constraints = Constraints::default();
        assert!(matches!(
            solve(&[], Objective::MaximizeValue, &constraints),
            Err(OptimizeError::NoCandidates)
        ));
    }

    #[test]
    fn scenario_comparison_finds_differing_projects() {
        let candidates = vec![
            candidate(1, 100_000.0, 3.0, 80.0, 10.0, 25.0),
            candidate(2, 150_000.0, 4.0, 90.0, 12.0, 50.0),
        ];
        let tight = Constraints {
            max_budget: 100_000.0,
            max_capacity: 12.0,
            ..Default::default()
        };
        let loose = Constraints {
            max_budget: 300_000.0,
            max_capacity: 12.0,
            ..Default::default()
        };
        let comparison = compare_scenarios(
            &candidates,
            Objective::MaximizeValue,
            &[("tight".to_string(), tight), ("loose".to_string(), loose)],
        )
        .unwrap();
        assert!(!comparison.differing_project_ids.is_empty());
    }
}
