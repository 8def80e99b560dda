//! Long-run learning aggregate.
//!
//! Only ended cycles whose convergence verdict is CONVERGED contribute.
//! Other ended cycles stay in history and add nothing.

use serde::{Deserialize, Serialize};

use crate::cycle::{Cycle, CycleStatus};
use crate::ledger::{EventKind, ExecutionEvent};

/// Completion metrics for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub completion_count: u32,
    /// Completions over creates, 0 when nothing was created.
    pub completion_rate: f64,
}

pub fn summarize_cycle(events: &[ExecutionEvent]) -> CycleSummary {
    let completed = events.iter().filter(|e| e.is_completion()).count();
    let created = events.iter().filter(|e| e.kind == EventKind::Create).count();
    CycleSummary {
        completion_count: u32::try_from(completed).unwrap_or(u32::MAX),
        completion_rate: if created > 0 {
            completed as f64 / created as f64
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileLearning {
    pub cycle_count: u32,
    pub total_completion_count: u32,
    pub average_completion_rate: f64,
}

fn is_learnable(cycle: &Cycle) -> bool {
    cycle.status == CycleStatus::Ended && cycle.convergence.as_ref().is_some_and(|r| r.is_converged())
}

/// Aggregate learning over every learnable cycle.
pub fn compute_profile_learning<'a>(cycles: impl IntoIterator<Item = &'a Cycle>) -> ProfileLearning {
    let summaries: Vec<CycleSummary> = cycles
        .into_iter()
        .filter(|c| is_learnable(c))
        .map(|c| c.summary.unwrap_or_else(|| summarize_cycle(c.ledger.events())))
        .collect();
    if summaries.is_empty() {
        return ProfileLearning::default();
    }
    let rate_sum: f64 = summaries
        .iter()
        .map(|s| if s.completion_rate.is_finite() { s.completion_rate } else { 0.0 })
        .sum();
    ProfileLearning {
        cycle_count: u32::try_from(summaries.len()).unwrap_or(u32::MAX),
        total_completion_count: summaries.iter().map(|s| s.completion_count).sum(),
        average_completion_rate: rate_sum / summaries.len() as f64,
    }
}
