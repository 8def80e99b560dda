//! Terminal convergence: the end-of-cycle verdict.
//!
//! Compares the planned terminal state (P_end, the deliverables' required
//! blocks) with the executed terminal state (E_end, linked completions by the
//! deadline). Unlinked activity is reported but never counted.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::deliverable::Deliverable;
use crate::ledger::{ExecutionEvent, LinkageStatus};
use crate::plan_proof::DeadlineType;
use crate::time::DayKey;

/// Reason recorded when a cycle ends without any deliverables.
pub const NO_DELIVERABLES_REASON: &str = "No deliverables defined; goal never formally structured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConvergenceVerdict {
    Converged,
    Incomplete,
    Failed,
}

impl fmt::Display for ConvergenceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Converged => "CONVERGED",
            Self::Incomplete => "INCOMPLETE",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableRequirement {
    pub deliverable_id: String,
    pub title: String,
    pub required_blocks: u32,
    pub criteria_ids: Vec<String>,
}

/// P_end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTerminalState {
    pub required_units: u32,
    pub deliverables: Vec<DeliverableRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DayKey>,
    pub deadline_type: DeadlineType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableExecution {
    pub deliverable_id: String,
    pub completed_blocks: u32,
    pub completed_minutes: u32,
    pub completion_rate: f64,
    pub criteria_done: u32,
}

/// E_end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTerminalState {
    pub completed_units: u32,
    pub deliverables: Vec<DeliverableExecution>,
    pub completions_by_deadline: u32,
    pub completions_after_deadline: u32,
    pub unlinked_activity_blocks: u32,
    pub unlinked_activity_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub verdict: ConvergenceVerdict,
    pub reasons: Vec<String>,
    #[serde(rename = "P_end")]
    pub p_end: PlanTerminalState,
    #[serde(rename = "E_end")]
    pub e_end: ExecutionTerminalState,
    pub tolerance: u32,
    pub computed_at: DateTime<Utc>,
}

impl ConvergenceReport {
    pub fn is_converged(&self) -> bool {
        self.verdict == ConvergenceVerdict::Converged
    }
}

/// Everything the judge reads.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceInput<'a> {
    pub deliverables: &'a [Deliverable],
    pub events: &'a [ExecutionEvent],
    pub deadline: Option<DayKey>,
    pub deadline_type: DeadlineType,
    /// Deficit each deliverable may carry and still converge.
    pub tolerance: u32,
    pub now: DateTime<Utc>,
    pub zone: Tz,
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Minutes an event contributes, 30 when unrecorded.
fn event_minutes(event: &ExecutionEvent) -> u32 {
    if event.minutes == 0 { 30 } else { event.minutes }
}

fn is_late(event: &ExecutionEvent, deadline: Option<DayKey>, zone: Tz) -> bool {
    match (deadline, event.effective_day(zone)) {
        (Some(deadline), Some(day)) => day > deadline,
        _ => false,
    }
}

pub fn plan_terminal_state(input: &ConvergenceInput<'_>) -> PlanTerminalState {
    PlanTerminalState {
        required_units: input.deliverables.iter().map(|d| d.required_blocks).sum(),
        deliverables: input
            .deliverables
            .iter()
            .map(|d| DeliverableRequirement {
                deliverable_id: d.id.clone(),
                title: d.title.clone(),
                required_blocks: d.required_blocks,
                criteria_ids: d.criteria.iter().map(|c| c.id.clone()).collect(),
            })
            .collect(),
        deadline: input.deadline,
        deadline_type: input.deadline_type,
    }
}

pub fn execution_terminal_state(input: &ConvergenceInput<'_>) -> ExecutionTerminalState {
    let zone = input.zone;

    let completions: Vec<&ExecutionEvent> = input.events.iter().filter(|e| e.is_completion()).collect();
    let (linked, unlinked): (Vec<&ExecutionEvent>, Vec<&ExecutionEvent>) = completions
        .into_iter()
        .partition(|e| e.linkage() == LinkageStatus::Linked);

    let late = linked.iter().filter(|e| is_late(e, input.deadline, zone)).count();
    let on_time = linked.len() - late;

    let deliverables = input
        .deliverables
        .iter()
        .map(|d| {
            let owned: Vec<&ExecutionEvent> = d.linked_completions(input.events, input.deadline, zone).collect();
            let completed_blocks = count(owned.len());
            DeliverableExecution {
                deliverable_id: d.id.clone(),
                completed_blocks,
                completed_minutes: owned.iter().map(|e| event_minutes(e)).sum(),
                completion_rate: if d.required_blocks > 0 {
                    f64::from(completed_blocks) / f64::from(d.required_blocks)
                } else {
                    0.0
                },
                criteria_done: count(d.criteria.iter().filter(|c| c.done).count()),
            }
        })
        .collect();

    ExecutionTerminalState {
        completed_units: count(on_time),
        deliverables,
        completions_by_deadline: count(on_time),
        completions_after_deadline: count(late),
        unlinked_activity_blocks: count(unlinked.len()),
        unlinked_activity_minutes: unlinked.iter().map(|e| event_minutes(e)).sum(),
    }
}

/// Verdict and ordered reasons for P_end against E_end.
pub fn convergence_verdict(
    p_end: &PlanTerminalState,
    e_end: &ExecutionTerminalState,
    tolerance: u32,
) -> (ConvergenceVerdict, Vec<String>) {
    let mut reasons = Vec::new();
    let mut all_met = true;
    for req in &p_end.deliverables {
        let completed = e_end
            .deliverables
            .iter()
            .find(|e| e.deliverable_id == req.deliverable_id)
            .map_or(0, |e| e.completed_blocks);
        let deficit = req.required_blocks.saturating_sub(completed);
        if deficit > tolerance {
            all_met = false;
            reasons.push(format!(
                "{}: required {}, completed {completed} (deficit: {deficit})",
                req.title, req.required_blocks
            ));
        }
    }

    let late = e_end.completions_after_deadline > 0 && p_end.deadline_type == DeadlineType::Hard;
    if late {
        reasons.push(format!(
            "{} blocks completed after deadline (hard deadline required)",
            e_end.completions_after_deadline
        ));
    }

    let verdict = if late {
        ConvergenceVerdict::Failed
    } else if !all_met {
        ConvergenceVerdict::Incomplete
    } else {
        ConvergenceVerdict::Converged
    };
    (verdict, reasons)
}

/// Judge a cycle at its end.
pub fn compute_terminal_convergence(input: &ConvergenceInput<'_>) -> ConvergenceReport {
    let p_end = plan_terminal_state(input);
    let e_end = execution_terminal_state(input);
    let (verdict, reasons) = if input.deliverables.is_empty() {
        (ConvergenceVerdict::Incomplete, vec![NO_DELIVERABLES_REASON.to_string()])
    } else {
        convergence_verdict(&p_end, &e_end, input.tolerance)
    };
    ConvergenceReport {
        verdict,
        reasons,
        p_end,
        e_end,
        tolerance: input.tolerance,
        computed_at: input.now,
    }
}
