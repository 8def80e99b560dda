//! Execution event ledger: the append-only source of truth for a cycle.
//!
//! Every scheduling action becomes an immutable [`ExecutionEvent`]. Nothing is
//! ever rewritten or removed; the calendar is reconstructed by replaying the
//! ledger through [`materialize::materialize`], and every append is gated by
//! the [`contract`].

pub mod contract;
pub mod materialize;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::time::DayKey;

pub use contract::{LegalitySnapshot, can_emit, legality_snapshot};
pub use materialize::{MaterializedBlock, MaterializedDay, Materialized, materialize};

// ═══════════════════════════════════════════════════════════════════════
// Enums
// ═══════════════════════════════════════════════════════════════════════

/// What an event does to its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Reschedule,
    Complete,
    Delete,
    /// Ledger-only fact emitted by rollover; never changes a block.
    Missed,
}

impl EventKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Reschedule => "reschedule",
            Self::Complete => "complete",
            Self::Delete => "delete",
            Self::Missed => "missed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Life domain a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    Body,
    Focus,
    Creation,
    Resources,
    #[default]
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
    Missed,
}

/// Whether a block is a firm commitment or a soft pencil-in.
///
/// Only committed blocks are carried forward by rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Committed,
    Tentative,
}

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Manual,
    Suggestion,
    AutoPlan,
    System,
}

/// Whether a block's work can count toward a deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkageStatus {
    Linked,
    UnlinkedActivity,
}

impl LinkageStatus {
    pub fn derive(deliverable_id: Option<&str>, criterion_id: Option<&str>) -> Self {
        if deliverable_id.is_some() || criterion_id.is_some() {
            Self::Linked
        } else {
            Self::UnlinkedActivity
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ExecutionEvent
// ═══════════════════════════════════════════════════════════════════════

/// One immutable ledger fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub id: String,
    pub block_id: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_key: Option<DayKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverable_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion_id: Option<String>,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BlockStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missed_at: Option<DateTime<Utc>>,
}

impl ExecutionEvent {
    /// A bare event with every optional field empty.
    pub fn new(id: impl Into<String>, block_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            block_id: block_id.into(),
            kind,
            day_key: None,
            start: None,
            end: None,
            minutes: 0,
            label: None,
            domain: Domain::Unclassified,
            goal_id: None,
            cycle_id: None,
            suggestion_id: None,
            deliverable_id: None,
            criterion_id: None,
            origin: Origin::Manual,
            completed: kind == EventKind::Complete,
            status: None,
            placement: None,
            missed_at: None,
        }
    }

    /// Set start/end and the day-key of the start in `zone`.
    pub fn with_window(mut self, start: DateTime<Utc>, minutes: u32, zone: Tz) -> Self {
        self.day_key = Some(DayKey::from_instant(start, zone));
        self.start = Some(start);
        self.end = Some(start + chrono::Duration::minutes(i64::from(minutes)));
        self.minutes = minutes;
        self
    }

    pub fn with_link(mut self, deliverable_id: Option<String>, criterion_id: Option<String>) -> Self {
        self.deliverable_id = deliverable_id;
        self.criterion_id = criterion_id;
        self
    }

    pub fn with_scope(mut self, goal_id: Option<String>, cycle_id: Option<String>) -> Self {
        self.goal_id = goal_id;
        self.cycle_id = cycle_id;
        self
    }

    pub fn linkage(&self) -> LinkageStatus {
        LinkageStatus::derive(self.deliverable_id.as_deref(), self.criterion_id.as_deref())
    }

    /// Whether this event records a finished unit of work.
    pub fn is_completion(&self) -> bool {
        self.kind == EventKind::Complete && self.completed
    }

    /// The calendar day the event is attributed to: its day-key, else the
    /// zone-local date of its start.
    pub fn effective_day(&self, zone: Tz) -> Option<DayKey> {
        self.day_key
            .or_else(|| self.start.map(|s| DayKey::from_instant(s, zone)))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ledger
// ═══════════════════════════════════════════════════════════════════════

/// Append-only event log for one cycle.
///
/// Serializes as the bare event list. The per-block legality fold is kept
/// alongside and advanced on every append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ExecutionEvent>", into = "Vec<ExecutionEvent>")]
pub struct Ledger {
    events: Vec<ExecutionEvent>,
    legality: HashMap<String, LegalitySnapshot>,
}

impl PartialEq for Ledger {
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events
    }
}

impl From<Vec<ExecutionEvent>> for Ledger {
    fn from(events: Vec<ExecutionEvent>) -> Self {
        Self::from_events(events)
    }
}

impl From<Ledger> for Vec<ExecutionEvent> {
    fn from(ledger: Ledger) -> Self {
        ledger.events
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing history without re-validating it.
    pub fn from_events(events: Vec<ExecutionEvent>) -> Self {
        let legality = legality_snapshot(&events)
            .into_iter()
            .map(|(id, status)| (id.to_string(), status))
            .collect();
        Self { events, legality }
    }

    /// Current legality of `block_id`; unknown ids are the default.
    pub fn legality(&self, block_id: &str) -> LegalitySnapshot {
        self.legality.get(block_id).copied().unwrap_or_default()
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append `event` if the execution contract permits it.
    ///
    /// Refusals are silent to the caller: the ledger is unchanged and
    /// `false` is returned.
    pub fn append(&mut self, event: ExecutionEvent) -> bool {
        if !self.legality(&event.block_id).permits(&event) {
            tracing::debug!(
                event_id = %event.id,
                block_id = %event.block_id,
                kind = %event.kind,
                "event refused by execution contract"
            );
            return false;
        }
        let status = self.legality.entry(event.block_id.clone()).or_default();
        *status = status.advance(event.kind);
        self.events.push(event);
        true
    }

    /// Append each event in order; returns how many were accepted.
    pub fn extend(&mut self, events: impl IntoIterator<Item = ExecutionEvent>) -> usize {
        events.into_iter().filter(|e| self.append(e.clone())).count()
    }

    /// Whether any event ever targeted `block_id`.
    pub fn mentions(&self, block_id: &str) -> bool {
        self.events.iter().any(|e| e.block_id == block_id)
    }

    /// Deterministic id for the next event on this ledger.
    pub fn next_event_id(&self, kind: EventKind, block_id: &str) -> String {
        format!("evt-{}-{}-{}", self.events.len(), kind.as_label(), block_id)
    }
}
