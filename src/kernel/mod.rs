//! Kernel entry point: `(snapshot, action) -> snapshot`.
//!
//! [`compute`] never mutates its input. It clones the snapshot, runs the one
//! handler for the action's variant, and refreshes every derived view. When a
//! handler refuses the action the prior snapshot comes back unchanged apart
//! from the denial list.
//!
//! ## Denials
//!
//! Every domain failure is a [`Denial`] in the returned snapshot, never an
//! `Err`. A handler may also record denials while still applying part of an
//! action, e.g. a proposal that places some sessions and reports conflicts
//! for the rest.

pub mod action;
mod handlers;
mod reports;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use action::Action;
pub use reports::GoalReport;

use crate::config::KernelConfig;
use crate::cycle::Cycle;
use crate::learning::ProfileLearning;
use crate::ledger::Materialized;
use crate::scheduler::ConflictCode;
use crate::time::{DayKey, parse_instant};

// ═══════════════════════════════════════════════════════════════════════
// Denials
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    GoalNotAdmitted,
    PlanUnschedulable,
    NoProposedBlocks,
    DeadlinePassed,
    OverlapAllSlots,
    ExceedsMaxPerDay,
    ExceedsMaxPerWeek,
    NoAllowedWindows,
    InvalidTimestamp,
    NoActiveCycle,
    CycleNotFound,
    CycleAlreadyEnded,
    EventRefused,
    SuggestionNotFound,
}

impl DenialCode {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::GoalNotAdmitted => "GOAL_NOT_ADMITTED",
            Self::PlanUnschedulable => "PLAN_UNSCHEDULABLE",
            Self::NoProposedBlocks => "NO_PROPOSED_BLOCKS",
            Self::DeadlinePassed => "DEADLINE_PASSED",
            Self::OverlapAllSlots => "OVERLAP_ALL_SLOTS",
            Self::ExceedsMaxPerDay => "EXCEEDS_MAX_PER_DAY",
            Self::ExceedsMaxPerWeek => "EXCEEDS_MAX_PER_WEEK",
            Self::NoAllowedWindows => "NO_ALLOWED_WINDOWS",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::NoActiveCycle => "NO_ACTIVE_CYCLE",
            Self::CycleNotFound => "CYCLE_NOT_FOUND",
            Self::CycleAlreadyEnded => "CYCLE_ALREADY_ENDED",
            Self::EventRefused => "EVENT_REFUSED",
            Self::SuggestionNotFound => "SUGGESTION_NOT_FOUND",
        }
    }

    /// Denial for a scheduler conflict.
    pub fn from_conflict(code: ConflictCode) -> Self {
        match code {
            ConflictCode::NoAllowedWindows => Self::NoAllowedWindows,
            ConflictCode::OverlapAllSlots => Self::OverlapAllSlots,
            ConflictCode::ExceedsMaxPerDay => Self::ExceedsMaxPerDay,
            ConflictCode::ExceedsMaxPerWeek => Self::ExceedsMaxPerWeek,
            ConflictCode::NoWorkableDays | ConflictCode::Unschedulable => Self::PlanUnschedulable,
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A refused or partially applied action, surfaced as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub code: DenialCode,
    pub detail: String,
}

impl Denial {
    pub fn new(code: DenialCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════════════════════════════════

/// The complete kernel state between calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub cycles: BTreeMap<String, Cycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_cycle_id: Option<String>,
    /// Local day of the last rollover evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rollover_day: Option<DayKey>,
    /// Instant of the last applied action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<DateTime<Utc>>,
    /// Calendar of the active cycle as of `now`.
    #[serde(default)]
    pub materialized: Materialized,
    #[serde(default)]
    pub reports: BTreeMap<String, GoalReport>,
    #[serde(default)]
    pub learning: ProfileLearning,
    /// Denials produced by the call that returned this snapshot.
    #[serde(default)]
    pub denials: Vec<Denial>,
}

impl Snapshot {
    pub fn active_cycle(&self) -> Option<&Cycle> {
        self.active_cycle_id.as_deref().and_then(|id| self.cycles.get(id))
    }

    pub fn denial_codes(&self) -> Vec<DenialCode> {
        self.denials.iter().map(|d| d.code).collect()
    }

    pub fn is_denied(&self, code: DenialCode) -> bool {
        self.denials.iter().any(|d| d.code == code)
    }

    fn refused(&self, denial: Denial) -> Self {
        let mut prior = self.clone();
        prior.denials = vec![denial];
        prior
    }
}

/// Per-call context every handler reads.
pub(crate) struct Call<'a> {
    pub now: DateTime<Utc>,
    pub config: &'a KernelConfig,
}

impl Call<'_> {
    pub fn today(&self) -> DayKey {
        DayKey::from_instant(self.now, self.config.constraints.zone)
    }
}

/// Apply `action` to `snapshot` under `config`.
pub fn compute(snapshot: &Snapshot, action: &Action, config: &KernelConfig) -> Snapshot {
    let Some(raw_now) = action.now() else {
        let mut next = snapshot.clone();
        next.denials.clear();
        return next;
    };
    let now = match parse_instant(raw_now) {
        Ok(now) => now,
        Err(err) => {
            tracing::warn!(action = action.as_label(), error = %err, "refusing action with invalid timestamp");
            return snapshot.refused(Denial::new(DenialCode::InvalidTimestamp, err.to_string()));
        }
    };

    let call = Call { now, config };
    let mut next = snapshot.clone();
    next.denials.clear();
    if let Err(denial) = handlers::dispatch(&mut next, action, &call) {
        tracing::debug!(action = action.as_label(), code = %denial.code, "action refused");
        return snapshot.refused(denial);
    }
    next.now = Some(now);
    reports::refresh(&mut next, &call);
    next
}

/// Apply `actions` in order and return the final snapshot.
pub fn replay<'a>(
    snapshot: &Snapshot,
    actions: impl IntoIterator<Item = &'a Action>,
    config: &KernelConfig,
) -> Snapshot {
    actions
        .into_iter()
        .fold(snapshot.clone(), |state, action| compute(&state, action, config))
}
