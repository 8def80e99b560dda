//! Cycles and the per-call workspace.
//!
//! A cycle owns one goal definition, its own ledger, deliverables and
//! suggestions. Handlers never touch a cycle directly: they
//! [`Workspace::hydrate`] the mutable parts, work on the workspace, and
//! [`Workspace::persist`] it back into a new cycle value.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::admission::AdmissionResult;
use crate::convergence::ConvergenceReport;
use crate::deliverable::Deliverable;
use crate::learning::CycleSummary;
use crate::ledger::{EventKind, Ledger, Materialized, materialize};
use crate::plan_proof::{DeadlineType, GoalEquation};
use crate::scheduler::{AutoAsanaPlan, BusyInterval};
use crate::time::DayKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    #[default]
    Active,
    Ended,
}

/// The goal a cycle pursues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDefinition {
    pub goal_id: String,
    pub equation: GoalEquation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    #[default]
    Suggested,
    Accepted,
    Rejected,
}

/// A scheduler placement offered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedBlock {
    pub id: String,
    pub goal_id: String,
    pub day: DayKey,
    pub start: DateTime<Utc>,
    pub minutes: u32,
    pub title: String,
    #[serde(default)]
    pub status: SuggestionStatus,
}

impl SuggestedBlock {
    /// Id of the block accepting this suggestion creates.
    pub fn block_id(&self) -> String {
        format!("blk-{}", self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Suggested
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: String,
    #[serde(default)]
    pub status: CycleStatus,
    pub start_day: DayKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_day: Option<DayKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<GoalDefinition>,
    #[serde(default)]
    pub ledger: Ledger,
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
    #[serde(default)]
    pub suggestions: Vec<SuggestedBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission: Option<AdmissionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_plan: Option<AutoAsanaPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CycleSummary>,
}

impl Cycle {
    pub fn new(id: impl Into<String>, start_day: DayKey) -> Self {
        Self {
            id: id.into(),
            status: CycleStatus::Active,
            start_day,
            end_day: None,
            goal: None,
            ledger: Ledger::new(),
            deliverables: Vec::new(),
            suggestions: Vec::new(),
            admission: None,
            auto_plan: None,
            convergence: None,
            summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CycleStatus::Active
    }

    pub fn goal_id(&self) -> Option<&str> {
        self.goal.as_ref().map(|g| g.goal_id.as_str())
    }

    pub fn deadline(&self) -> Option<DayKey> {
        self.goal.as_ref().and_then(|g| g.equation.deadline)
    }

    pub fn deadline_type(&self) -> DeadlineType {
        self.goal
            .as_ref()
            .map(|g| g.equation.deadline_type)
            .unwrap_or_default()
    }
}

/// The mutable slice of a cycle a handler works on.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub cycle_id: String,
    pub goal: Option<GoalDefinition>,
    pub admission: Option<AdmissionResult>,
    pub ledger: Ledger,
    pub deliverables: Vec<Deliverable>,
    pub suggestions: Vec<SuggestedBlock>,
    pub auto_plan: Option<AutoAsanaPlan>,
}

impl Workspace {
    pub fn hydrate(cycle: &Cycle) -> Self {
        Self {
            cycle_id: cycle.id.clone(),
            goal: cycle.goal.clone(),
            admission: cycle.admission.clone(),
            ledger: cycle.ledger.clone(),
            deliverables: cycle.deliverables.clone(),
            suggestions: cycle.suggestions.clone(),
            auto_plan: cycle.auto_plan.clone(),
        }
    }

    /// Write the workspace back over `cycle`'s mutable parts.
    pub fn persist(self, cycle: Cycle) -> Cycle {
        Cycle {
            goal: self.goal,
            admission: self.admission,
            ledger: self.ledger,
            deliverables: self.deliverables,
            suggestions: self.suggestions,
            auto_plan: self.auto_plan,
            ..cycle
        }
    }

    pub fn goal_id(&self) -> Option<&str> {
        self.goal.as_ref().map(|g| g.goal_id.as_str())
    }

    pub fn materialize(&self, as_of: DayKey, zone: Tz) -> Materialized {
        materialize(self.ledger.events(), as_of, zone)
    }

    /// Every live block as a busy interval for the scheduler.
    pub fn busy_intervals(&self, as_of: DayKey, zone: Tz) -> Vec<BusyInterval> {
        self.materialize(as_of, zone)
            .blocks_by_id
            .values()
            .map(|b| BusyInterval {
                start: b.start,
                minutes: b.minutes(),
            })
            .collect()
    }

    /// Whether the ledger already holds a create for `suggestion_id`.
    pub fn suggestion_created(&self, suggestion_id: &str) -> bool {
        self.ledger
            .events()
            .iter()
            .any(|e| e.kind == EventKind::Create && e.suggestion_id.as_deref() == Some(suggestion_id))
    }

    pub fn suggestion_mut(&mut self, suggestion_id: &str) -> Option<&mut SuggestedBlock> {
        self.suggestions.iter_mut().find(|s| s.id == suggestion_id)
    }
}
