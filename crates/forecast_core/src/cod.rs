//! CoD Sequencer — pure function, no Engine dependency once each project has
//! a P85 duration estimate. Computes WSJF rankings and total Cost of Delay
//! under four ordering strategies, and reports the savings of the best
//! strategy over the portfolio's input order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SequencingError;
use crate::model::{PortfolioProject, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Wsjf,
    Sjf,
    CodFirst,
    BvFirst,
}

const ALL_STRATEGIES: [Strategy; 4] = [
    Strategy::Wsjf,
    Strategy::Sjf,
    Strategy::CodFirst,
    Strategy::BvFirst,
];

/// One project's position in a sequenced ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequencedProject {
    pub project_id: ProjectId,
    pub wsjf: f64,
    pub duration_p85_weeks: f64,
    pub cumulative_start_week: f64,
    pub cumulative_end_week: f64,
    pub accrued_cod: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyResult {
    pub strategy: Strategy,
    pub ordering: Vec<SequencedProject>,
    pub total_cod: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodReport {
    pub by_strategy: Vec<StrategyResult>,
    pub best_strategy: Strategy,
    pub input_order_total_cod: f64,
    pub savings_vs_input_order: f64,
    /// Projects filtered out because their P85 duration was `<= 0`.
    pub filtered_project_ids: Vec<ProjectId>,
    /// WSJF in the top quartile and duration below the median.
    pub urgent_project_ids: Vec<ProjectId>,
}

struct Candidate {
    member: PortfolioProject,
    duration: f64,
    wsjf: f64,
}

/// Sequence `members` under all four strategies, using `durations_p85` (one
/// entry per project) as each project's P85 duration estimate.
pub fn sequence(
    members: &[PortfolioProject],
    durations_p85: &HashMap<ProjectId, f64>,
) -> Result<CodReport, SequencingError> {
    let mut filtered_project_ids = Vec::new();
    let mut candidates = Vec::new();

    for member in members {
        let duration = durations_p85.get(&member.project_id).copied().unwrap_or(0.0);
        match member.wsjf(duration) {
            Some(wsjf) => candidates.push(Candidate {
                member: member.clone(),
                duration,
                wsjf,
            }),
            None => filtered_project_ids.push(member.project_id),
        }
    }

    if candidates.is_empty() {
        return Err(SequencingError::NoSequenceableProjects);
    }

    let by_strategy: Vec<StrategyResult> = ALL_STRATEGIES
        .iter()
        .map(|&strategy| run_strategy(&candidates, strategy))
        .collect();

    let best = by_strategy
        .iter()
        .min_by(|a, b| a.total_cod.total_cmp(&b.total_cod))
        .expect("ALL_STRATEGIES is non-empty");
    let best_strategy = best.strategy;

    let input_order_total_cod = total_cod_in_order(
        &sorted_by(&candidates, |c| c.member.priority_in_portfolio as f64),
    );

    let urgent_project_ids = urgent_projects(&candidates);

    Ok(CodReport {
        by_strategy,
        best_strategy,
        input_order_total_cod,
        savings_vs_input_order: input_order_total_cod - best.total_cod,
        filtered_project_ids,
        urgent_project_ids,
    })
}

fn run_strategy(candidates: &[Candidate], strategy: Strategy) -> StrategyResult {
    let ordered = match strategy {
        Strategy::Wsjf => sorted_by(candidates, |c| -c.wsjf),
        Strategy::Sjf => sorted_by(candidates, |c| c.duration),
        Strategy::CodFirst => sorted_by(candidates, |c| -c.member.cod_weekly),
        Strategy::BvFirst => sorted_by(candidates, |c| -c.member.business_value),
    };

    let mut cumulative = 0.0;
    let mut total_cod = 0.0;
    let mut ordering = Vec::with_capacity(ordered.len());
    for c in &ordered {
        let start = cumulative;
        cumulative += c.duration;
        let accrued = c.member.cod_weekly * cumulative;
        total_cod += accrued;
        ordering.push(SequencedProject {
            project_id: c.member.project_id,
            wsjf: c.wsjf,
            duration_p85_weeks: c.duration,
            cumulative_start_week: start,
            cumulative_end_week: cumulative,
            accrued_cod: accrued,
        });
    }

    StrategyResult {
        strategy,
        ordering,
        total_cod,
    }
}

/// Stable sort by ascending key, tie-broken by project id.
fn sorted_by<'a, F: Fn(&Candidate) -> f64>(candidates: &'a [Candidate], key: F) -> Vec<&'a Candidate> {
    let mut refs: Vec<&Candidate> = candidates.iter().collect();
    refs.sort_by(|a, b| {
        key(a)
            .total_cmp(&key(b))
            .then_with(|| a.member.project_id.0.cmp(&b.member.project_id.0))
    });
    refs
}

fn total_cod_in_order(ordered: &[&Candidate]) -> f64 {
    let mut cumulative = 0.0;
    let mut total = 0.0;
    for c in ordered {
        cumulative += c.duration;
        total += c.member.cod_weekly * cumulative;
    }
    total
}

fn urgent_projects(candidates: &[Candidate]) -> Vec<ProjectId> {
    let mut wsjfs: Vec<f64> = candidates.iter().map(|c| c.wsjf).collect();
    wsjfs.sort_by(|a, b| a.total_cmp(b));
    let mut durations: Vec<f64> = candidates.iter().map(|c| c.duration).collect();
    durations.sort_by(|a, b| a.total_cmp(b));

    let wsjf_q3 = crate::util::percentiles::nearest_rank(&wsjfs, 0.75);
    let duration_median = crate::util::percentiles::nearest_rank(&durations, 0.50);

    candidates
        .iter()
        .filter(|c| c.wsjf >= wsjf_q3 && c.duration <= duration_median)
        .map(|c| c.member.project_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortfolioId;
    use std::collections::BTreeSet;

    fn pp(id: u32, priority: u8, cod: f64, bv: f64, tc: f64, rr: f64) -> PortfolioProject {
        PortfolioProject {
            portfolio_id: PortfolioId(1),
            project_id: ProjectId(id),
            priority_in_portfolio: priority,
            allocation_pct: 100,
            cod_weekly: cod,
            business_value: bv,
            time_criticality: tc,
            risk_reduction: rr,
            dependencies: BTreeSet::new(),
        }
    }

    #[test]
    fn wsjf_strategy_never_loses_to_alternatives() {
        // WSJF's total sequential CoD is <= every other
        // strategy's, for nonnegative BV/TC/RR and positive durations.
        let members = vec![
            pp(1, 3, 3000.0, 90.0, 80.0, 10.0),
            pp(2, 1, 2000.0, 40.0, 20.0, 5.0),
            pp(3, 2, 2500.0, 60.0, 50.0, 30.0),
        ];
        let durations: HashMap<ProjectId, f64> = [
            (ProjectId(1), 4.0),
            (ProjectId(2), 12.0),
            (ProjectId(3), 8.0),
        ]
        .into_iter()
        .collect();

        let report = sequence(&members, &durations).unwrap();
        let wsjf_cod = report
            .by_strategy
            .iter()
            .find(|r| r.strategy == Strategy::Wsjf)
            .unwrap()
            .total_cod;
        for r in &report.by_strategy {
            assert!(wsjf_cod <= r.total_cod + 1e-9);
        }
        assert_eq!(report.best_strategy, Strategy::Wsjf);
    }

    #[test]
    fn zero_duration_projects_are_filtered_with_a_record() {
        let members = vec![pp(1, 1, 1000.0, 50.0, 50.0, 0.0), pp(2, 2, 500.0, 10.0, 10.0, 0.0)];
        let durations: HashMap<ProjectId, f64> =
            [(ProjectId(1), 5.0), (ProjectId(2), 0.0)].into_iter().collect();
        let report = sequence(&members, &durations).unwrap();
        assert_eq!(report.filtered_project_ids, vec![ProjectId(2)]);
    }

    #[test]
    fn all_zero_duration_is_an_error() {
        let members = vec![pp(1, 1, 1000.0, 50.0, 50.0, 0.0)];
        let durations: HashMap<ProjectId, f64> = [(ProjectId(1), 0.0)].into_iter().collect();
        assert!(matches!(
            sequence(&members, &durations),
            Err(SequencingError::NoSequenceableProjects)
        ));
    }

    #[test]
    fn savings_is_non_negative() {
        let members = vec![
            pp(1, 2, 3000.0, 90.0, 80.0, 10.0),
            pp(2, 1, 2000.0, 40.0, 20.0, 5.0),
        ];
        let durations: HashMap<ProjectId, f64> =
            [(ProjectId(1), 4.0), (ProjectId(2), 10.0)].into_iter().collect();
        let report = sequence(&members, &durations).unwrap();
        assert!(report.savings_vs_input_order >= 0.0);
    }

    #[test]
    fn wsjf_savings_matches_expected_totals() {
        // Project 1: WSJF score (90+80+10)/5 = 36, input priority 2.
        // Project 2: WSJF score (40+20+5)/5 = 13, input priority 1 (so the
        // input order sequences project 2 before project 1). Both P85
        // durations are 5 weeks; CoD rates are chosen so that the WSJF
        // ordering (1 then 2) totals 189,750, the input-priority ordering
        // (2 then 1) totals 311,250, and the savings are 121,500:
        //   WSJF order:  28850*5 + 4550*10 = 144250 + 45500 = 189750
        //   input order: 4550*5 + 28850*10 =  22750 + 288500 = 311250
        let members = vec![
            pp(1, 2, 28_850.0, 90.0, 80.0, 10.0),
            pp(2, 1, 4_550.0, 40.0, 20.0, 5.0),
        ];
        let durations: HashMap<ProjectId, f64> =
            [(ProjectId(1), 5.0), (ProjectId(2), 5.0)].into_iter().collect();

        let report = sequence(&members, &durations).unwrap();
        let wsjf_total = report
            .by_strategy
            .iter()
            .find(|r| r.strategy == Strategy::Wsjf)
            .unwrap()
            .total_cod;

        assert_eq!(report.best_strategy, Strategy::Wsjf);
        assert!((wsjf_total - 189_750.0).abs() <= 1e-6);
        assert!((report.input_order_total_cod - 311_250.0).abs() <= 1e-6);
        assert!((report.savings_vs_input_order - 121_500.0).abs() <= 1e-6);
    }
}
