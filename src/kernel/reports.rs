//! Derived views recomputed after every applied action.

use serde::{Deserialize, Serialize};

use super::{Call, Snapshot};
use crate::admission::AdmissionStatus;
use crate::cycle::Cycle;
use crate::feasibility::{FeasibilityRequest, FeasibilityResult, WorkItem, compute_feasibility, work_items_from_deliverables};
use crate::learning::compute_profile_learning;
use crate::ledger::{Materialized, materialize};
use crate::plan_proof::{PlanProof, derive_plan_proof};
use crate::probability::{ProbabilityRequest, ProbabilityResult, ProbabilityWindow, score_probability};
use crate::scheduler::ConflictCode;

/// Feasibility and probability for one admitted goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalReport {
    pub goal_id: String,
    pub cycle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_status: Option<AdmissionStatus>,
    /// Derived from the equation as of the call's day.
    pub plan_proof: PlanProof,
    pub feasibility: FeasibilityResult,
    pub probability: ProbabilityResult,
}

pub(super) fn refresh(state: &mut Snapshot, call: &Call<'_>) {
    let zone = call.config.constraints.zone;
    let today = call.today();

    state.materialized = state
        .active_cycle()
        .filter(|c| c.is_active())
        .map(|c| materialize(c.ledger.events(), today, zone))
        .unwrap_or_else(Materialized::default);

    state.reports.clear();
    if let Some(report) = state.active_cycle().and_then(|c| goal_report(c, call)) {
        state.reports.insert(report.goal_id.clone(), report);
    }

    state.learning = compute_profile_learning(state.cycles.values());
}

/// Remaining work when the cycle has no deliverables: the goal's whole
/// target minus every completion attributed to it.
fn goal_work_item(goal_id: &str, units: f64, cycle: &Cycle) -> WorkItem {
    let target = units.max(0.0).ceil() as u32;
    let done = cycle
        .ledger
        .events()
        .iter()
        .filter(|e| e.is_completion() && e.goal_id.as_deref() == Some(goal_id))
        .count();
    WorkItem {
        id: goal_id.to_string(),
        title: goal_id.to_string(),
        blocks_remaining: target.saturating_sub(u32::try_from(done).unwrap_or(u32::MAX)),
        must_finish_by: None,
    }
}

fn goal_report(cycle: &Cycle, call: &Call<'_>) -> Option<GoalReport> {
    let admission = cycle.admission.as_ref().filter(|a| a.is_admitted())?;
    let goal = cycle.goal.as_ref()?;
    let deadline = goal.equation.deadline?;
    let policy = &call.config.constraints;
    let events = cycle.ledger.events();
    let plan_proof = derive_plan_proof(&goal.equation, call.today());

    let work_items = if cycle.deliverables.is_empty() {
        vec![goal_work_item(&goal.goal_id, goal.equation.required_units(), cycle)]
    } else {
        work_items_from_deliverables(&cycle.deliverables, events, policy)
    };

    let feasibility = compute_feasibility(&FeasibilityRequest {
        goal_id: &goal.goal_id,
        deadline,
        work_items: &work_items,
        events,
        policy,
        fallback_cap: plan_proof.max_per_day,
        now: call.now,
    });

    let conflicts: Vec<ConflictCode> = cycle
        .auto_plan
        .as_ref()
        .map(|plan| plan.conflict_codes())
        .unwrap_or_default();
    let window = ProbabilityWindow::resolve(Some(cycle.start_day), call.now, policy);
    let probability = score_probability(&ProbabilityRequest {
        goal_id: &goal.goal_id,
        feasibility: &feasibility,
        plan_proof: Some(&plan_proof),
        policy,
        events,
        window: &window,
        conflicts: &conflicts,
    });

    Some(GoalReport {
        goal_id: goal.goal_id.clone(),
        cycle_id: cycle.id.clone(),
        admission_status: Some(admission.status),
        plan_proof,
        feasibility,
        probability,
    })
}
