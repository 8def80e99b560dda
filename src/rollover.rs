//! Midnight rollover: carry unfinished commitments into the new day.
//!
//! When the zone-local day changes, every committed block from the prior
//! day that was not completed produces a `missed` fact on the original block
//! and a fresh `overdue-<id>-<day>` block at the same local clock time on the
//! new day. The engine only computes events; the caller appends them.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ledger::{
    BlockStatus, EventKind, ExecutionEvent, Ledger, MaterializedBlock, Placement,
    materialize,
};
use crate::time::{DayKey, build_local_start, local_clock, utc_start};

/// A block carried forward by one rollover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueBlock {
    pub original_id: String,
    pub new_id: String,
    pub original_day: DayKey,
    pub new_day: DayKey,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes: u32,
}

/// Result of one rollover evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloverOutcome {
    /// Events to append, in order: `missed` then `create` per carried block.
    pub events: Vec<ExecutionEvent>,
    pub carried_block_ids: Vec<String>,
    pub overdue: Vec<OverdueBlock>,
    /// Day-key to record as the last rollover day.
    pub rolled_day: DayKey,
}

impl RolloverOutcome {
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    /// Append the emitted events to `ledger`; returns how many were accepted.
    pub fn apply(&self, ledger: &mut Ledger) -> usize {
        ledger.extend(self.events.iter().cloned())
    }
}

/// Whether `now` falls on a different local day than the last rollover.
pub fn should_rollover(last: Option<DayKey>, now: DateTime<Utc>, zone: Tz) -> bool {
    last != Some(DayKey::from_instant(now, zone))
}

/// Id of the block that carries `original_id` into `day`.
pub fn overdue_id(original_id: &str, day: DayKey) -> String {
    format!("overdue-{original_id}-{day}")
}

/// Evaluate the midnight boundary for `ledger` at `now`.
pub fn rollover_at_midnight(
    ledger: &Ledger,
    last: Option<DayKey>,
    now: DateTime<Utc>,
    zone: Tz,
) -> RolloverOutcome {
    let today = DayKey::from_instant(now, zone);
    let mut outcome = RolloverOutcome {
        events: Vec::new(),
        carried_block_ids: Vec::new(),
        overdue: Vec::new(),
        rolled_day: today,
    };
    if !should_rollover(last, now, zone) {
        return outcome;
    }

    let yesterday = today.add_days(-1);
    let view = materialize(ledger.events(), today, zone);
    let carried = view
        .day(yesterday)
        .iter()
        .filter(|b| b.placement == Placement::Committed && !b.is_completed());

    for block in carried {
        let new_id = overdue_id(&block.id, today);
        if ledger.mentions(&new_id) {
            continue;
        }
        let minutes = block.minutes().max(1);
        let start = carry_start(block, today, zone);
        let end = start + Duration::minutes(i64::from(minutes));

        outcome.events.push(missed_event(block, yesterday, today, minutes, now));
        outcome
            .events
            .push(overdue_event(block, &new_id, today, start, end, minutes));
        outcome.carried_block_ids.push(block.id.clone());
        outcome.overdue.push(OverdueBlock {
            original_id: block.id.clone(),
            new_id,
            original_day: yesterday,
            new_day: today,
            start,
            end,
            minutes,
        });
    }

    if !outcome.carried_block_ids.is_empty() {
        tracing::info!(
            day = %today,
            carried = outcome.carried_block_ids.len(),
            "rolled unfinished commitments into the new day"
        );
    }
    outcome
}

/// Same local wall time on `day`, else the same clock read as UTC.
fn carry_start(block: &MaterializedBlock, day: DayKey, zone: Tz) -> DateTime<Utc> {
    let clock = local_clock(block.start, zone);
    build_local_start(day, clock, zone).unwrap_or_else(|_| utc_start(day, clock))
}

fn missed_event(
    block: &MaterializedBlock,
    yesterday: DayKey,
    today: DayKey,
    minutes: u32,
    now: DateTime<Utc>,
) -> ExecutionEvent {
    let mut event = carry_fields(
        ExecutionEvent::new(
            format!("missed-{}-{today}", block.id),
            block.id.clone(),
            EventKind::Missed,
        ),
        block,
    );
    event.day_key = Some(yesterday);
    event.start = Some(block.start);
    event.end = Some(block.end);
    event.minutes = minutes;
    event.completed = false;
    event.status = Some(BlockStatus::Missed);
    event.missed_at = Some(now);
    event
}

fn overdue_event(
    block: &MaterializedBlock,
    new_id: &str,
    today: DayKey,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    minutes: u32,
) -> ExecutionEvent {
    let mut event = carry_fields(
        ExecutionEvent::new(format!("create-{new_id}"), new_id, EventKind::Create),
        block,
    );
    event.day_key = Some(today);
    event.start = Some(start);
    event.end = Some(end);
    event.minutes = minutes;
    event.status = Some(block.status);
    event.placement = Some(Placement::Committed);
    event
}

fn carry_fields(mut event: ExecutionEvent, block: &MaterializedBlock) -> ExecutionEvent {
    event.label = Some(block.label.clone());
    event.domain = block.domain;
    event.goal_id = block.goal_id.clone();
    event.cycle_id = block.cycle_id.clone();
    event.suggestion_id = block.suggestion_id.clone();
    event.deliverable_id = block.deliverable_id.clone();
    event.criterion_id = block.criterion_id.clone();
    event.origin = block.origin;
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LinkageStatus;
    use crate::time::parse_instant;

    const CHI: Tz = chrono_tz::America::Chicago;

    fn at(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn dk(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    fn create(block: &str, start: &str, placement: Placement) -> ExecutionEvent {
        let mut e = ExecutionEvent::new(format!("c-{block}"), block, EventKind::Create)
            .with_window(at(start), 60, CHI);
        e.placement = Some(placement);
        e
    }

    fn seeded() -> Ledger {
        let mut ledger = Ledger::new();
        // 09:00 and 14:00 Chicago on the 10th (CDT, UTC-5).
        ledger.append(
            create("a", "2026-06-10T14:00:00Z", Placement::Committed)
                .with_link(Some("d1".into()), None),
        );
        ledger.append(create("b", "2026-06-10T19:00:00Z", Placement::Committed));
        ledger.append(create("c", "2026-06-10T15:00:00Z", Placement::Committed));
        ledger.append(ExecutionEvent::new("x", "c", EventKind::Complete));
        ledger.append(create("t", "2026-06-10T16:00:00Z", Placement::Tentative));
        ledger
    }

    #[test]
    fn same_day_is_noop() {
        let now = at("2026-06-11T15:00:00Z");
        let out = rollover_at_midnight(&seeded(), Some(dk("2026-06-11")), now, CHI);
        assert!(out.is_noop());
        assert_eq!(out.rolled_day, dk("2026-06-11"));
    }

    #[test]
    fn carries_committed_incomplete_blocks() {
        let now = at("2026-06-11T06:00:00Z"); // 01:00 local on the 11th
        let out = rollover_at_midnight(&seeded(), Some(dk("2026-06-10")), now, CHI);

        assert_eq!(out.carried_block_ids, ["a", "b"]);
        assert_eq!(out.events.len(), 4);
        let missed = out.events.iter().filter(|e| e.kind == EventKind::Missed).count();
        let creates: Vec<_> = out.events.iter().filter(|e| e.kind == EventKind::Create).collect();
        assert_eq!(missed, 2);
        assert_eq!(creates.len(), 2);
        for create in &creates {
            assert!(create.block_id.starts_with("overdue-"));
            assert_eq!(create.day_key, Some(dk("2026-06-11")));
            assert_eq!(create.placement, Some(Placement::Committed));
        }
    }

    #[test]
    fn overdue_block_keeps_local_clock_and_linkage() {
        let now = at("2026-06-11T06:00:00Z");
        let out = rollover_at_midnight(&seeded(), Some(dk("2026-06-10")), now, CHI);
        let a = &out.overdue[0];
        assert_eq!(a.new_id, "overdue-a-2026-06-11");
        assert_eq!(a.start, at("2026-06-11T14:00:00Z"));
        assert_eq!(a.minutes, 60);

        let create = out.events.iter().find(|e| e.block_id == a.new_id).unwrap();
        assert_eq!(create.linkage(), LinkageStatus::Linked);
        let missed = out.events.iter().find(|e| e.kind == EventKind::Missed).unwrap();
        assert_eq!(missed.day_key, Some(dk("2026-06-10")));
        assert_eq!(missed.missed_at, Some(now));
        assert!(!missed.completed);
    }

    #[test]
    fn clock_skipped_by_dst_falls_back_to_utc() {
        let mut ledger = Ledger::new();
        // 02:30 CST on the 7th; 02:30 does not exist in Chicago on the 8th.
        ledger.append(create("early", "2026-03-07T08:30:00Z", Placement::Committed));
        let out = rollover_at_midnight(&ledger, Some(dk("2026-03-07")), at("2026-03-08T12:00:00Z"), CHI);

        assert_eq!(out.overdue.len(), 1);
        let carried = &out.overdue[0];
        assert_eq!(carried.original_day, dk("2026-03-07"));
        assert_eq!(carried.new_day, dk("2026-03-08"));
        assert_eq!(carried.start, at("2026-03-08T02:30:00Z"));
        assert_eq!(carried.end, at("2026-03-08T03:30:00Z"));
    }

    #[test]
    fn applying_twice_does_not_double_emit() {
        let mut ledger = seeded();
        let now = at("2026-06-11T06:00:00Z");
        let out = rollover_at_midnight(&ledger, Some(dk("2026-06-10")), now, CHI);
        assert_eq!(out.apply(&mut ledger), 4);

        // A caller that forgot to record the rollover day still gets nothing new.
        let again = rollover_at_midnight(&ledger, Some(dk("2026-06-10")), now, CHI);
        assert!(again.is_noop());
    }

    #[test]
    fn carried_blocks_land_on_new_day_after_materialize() {
        let mut ledger = seeded();
        let now = at("2026-06-11T06:00:00Z");
        rollover_at_midnight(&ledger, None, now, CHI).apply(&mut ledger);
        let view = materialize(ledger.events(), dk("2026-06-11"), CHI);
        assert_eq!(view.today_blocks.len(), 2);
        // Originals remain on the prior day untouched.
        assert_eq!(view.day(dk("2026-06-10")).len(), 4);
    }
}
