//! Materializer: fold the ledger into the current calendar.
//!
//! Replay order is append order. The fold is a pure function of the event
//! slice, the as-of day and the zone, so the same ledger always yields the
//! same calendar.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{BlockStatus, Domain, EventKind, ExecutionEvent, LinkageStatus, Origin, Placement};
use crate::time::{ClockTime, DayKey, utc_start};

/// Duration given to a block whose first event carries none.
const DEFAULT_BLOCK_MINUTES: u32 = 30;

/// Default wall time (UTC) for a block built without a start.
const DEFAULT_START_HOUR: u32 = 8;

/// Current state of one scheduled block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedBlock {
    pub id: String,
    pub cycle_id: Option<String>,
    pub goal_id: Option<String>,
    pub suggestion_id: Option<String>,
    pub deliverable_id: Option<String>,
    pub criterion_id: Option<String>,
    pub origin: Origin,
    pub domain: Domain,
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BlockStatus,
    pub placement: Placement,
}

impl MaterializedBlock {
    pub fn minutes(&self) -> u32 {
        u32::try_from((self.end - self.start).num_minutes().max(0)).unwrap_or(u32::MAX)
    }

    pub fn linkage(&self) -> LinkageStatus {
        LinkageStatus::derive(self.deliverable_id.as_deref(), self.criterion_id.as_deref())
    }

    pub fn is_completed(&self) -> bool {
        self.status == BlockStatus::Completed
    }

    /// Build a block from an event with no prior record.
    fn from_event(event: &ExecutionEvent, as_of: DayKey, zone: Tz) -> Self {
        let base_day = event.effective_day(zone).unwrap_or(as_of);
        let start = event
            .start
            .unwrap_or_else(|| utc_start(base_day, ClockTime::new(DEFAULT_START_HOUR, 0)));
        let minutes = if event.minutes == 0 {
            DEFAULT_BLOCK_MINUTES
        } else {
            event.minutes
        };
        let end = event
            .end
            .unwrap_or(start + Duration::minutes(i64::from(minutes)));
        let domain = match event.domain {
            Domain::Unclassified => Domain::Focus,
            other => other,
        };
        let status = event.status.unwrap_or(if event.completed {
            BlockStatus::Completed
        } else {
            BlockStatus::Planned
        });

        Self {
            id: event.block_id.clone(),
            cycle_id: event.cycle_id.clone(),
            goal_id: event.goal_id.clone(),
            suggestion_id: event.suggestion_id.clone(),
            deliverable_id: event.deliverable_id.clone(),
            criterion_id: event.criterion_id.clone(),
            origin: event.origin,
            domain,
            label: event.label.clone().unwrap_or_else(|| "Block".to_string()),
            start,
            end,
            status,
            placement: event.placement.unwrap_or_default(),
        }
    }

    /// Apply the field overrides an event carries.
    fn apply(&mut self, event: &ExecutionEvent) {
        if let Some(label) = &event.label {
            self.label = label.clone();
        }
        let moves = matches!(event.kind, EventKind::Create | EventKind::Reschedule);
        if moves {
            if let Some(start) = event.start {
                self.start = start;
            }
            if let Some(end) = event.end {
                self.end = end;
            }
        }
        if let Some(status) = event.status {
            self.status = status;
        }
        if event.domain != Domain::Unclassified {
            self.domain = event.domain;
        }
        if event.deliverable_id.is_some() {
            self.deliverable_id = event.deliverable_id.clone();
        }
        if event.criterion_id.is_some() {
            self.criterion_id = event.criterion_id.clone();
        }
        if let Some(placement) = event.placement {
            self.placement = placement;
        }
        if moves && event.minutes > 0 && event.end.is_none() {
            self.end = self.start + Duration::minutes(i64::from(event.minutes));
        }
    }
}

/// All blocks whose current start falls on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedDay {
    pub day: DayKey,
    pub blocks: Vec<MaterializedBlock>,
    /// Completed blocks / all blocks, 0 for an empty day.
    pub completion_rate: f64,
}

/// The calendar reconstructed from a ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Materialized {
    pub blocks_by_id: BTreeMap<String, MaterializedBlock>,
    pub days: BTreeMap<DayKey, MaterializedDay>,
    pub today_blocks: Vec<MaterializedBlock>,
}

impl Materialized {
    pub fn day(&self, day: DayKey) -> &[MaterializedBlock] {
        self.days.get(&day).map(|d| d.blocks.as_slice()).unwrap_or(&[])
    }

    pub fn block(&self, id: &str) -> Option<&MaterializedBlock> {
        self.blocks_by_id.get(id)
    }
}

/// Replay `events` in order and bucket the surviving blocks by local day.
pub fn materialize(events: &[ExecutionEvent], as_of: DayKey, zone: Tz) -> Materialized {
    let mut by_id: BTreeMap<String, MaterializedBlock> = BTreeMap::new();
    let mut completed: HashSet<&str> = HashSet::new();
    let mut deleted: HashSet<&str> = HashSet::new();

    for event in events {
        let id = event.block_id.as_str();
        if id.is_empty() || event.kind == EventKind::Missed || deleted.contains(id) {
            continue;
        }
        if event.kind == EventKind::Delete {
            deleted.insert(id);
            by_id.remove(id);
            continue;
        }

        let mut block = match by_id.get(id) {
            Some(existing) => existing.clone(),
            None if matches!(event.kind, EventKind::Create | EventKind::Complete) => {
                MaterializedBlock::from_event(event, as_of, zone)
            }
            None => continue,
        };
        block.apply(event);

        if event.completed || event.kind == EventKind::Complete {
            completed.insert(id);
        }
        if completed.contains(id) {
            block.status = BlockStatus::Completed;
        }
        by_id.insert(id.to_string(), block);
    }

    let mut buckets: BTreeMap<DayKey, Vec<MaterializedBlock>> = BTreeMap::new();
    for block in by_id.values() {
        buckets
            .entry(DayKey::from_instant(block.start, zone))
            .or_default()
            .push(block.clone());
    }

    let days: BTreeMap<DayKey, MaterializedDay> = buckets
        .into_iter()
        .map(|(day, mut blocks)| {
            blocks.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
            let done = blocks.iter().filter(|b| b.is_completed()).count();
            let completion_rate = if blocks.is_empty() {
                0.0
            } else {
                done as f64 / blocks.len() as f64
            };
            (
                day,
                MaterializedDay {
                    day,
                    blocks,
                    completion_rate,
                },
            )
        })
        .collect();

    let today_blocks = days
        .get(&as_of)
        .map(|d| d.blocks.clone())
        .unwrap_or_default();

    Materialized {
        blocks_by_id: by_id,
        days,
        today_blocks,
    }
}
