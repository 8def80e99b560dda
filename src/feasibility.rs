//! Feasibility engine: can the remaining work still fit before the deadline?
//!
//! A pure function of remaining work, the deadline, the constraint policy,
//! the ledger and "now". Capacity is counted in blocks per local day.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintPolicy;
use crate::deliverable::Deliverable;
use crate::ledger::ExecutionEvent;
use crate::time::{DayKey, day_start};

/// A piece of remaining work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub blocks_remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_finish_by: Option<DayKey>,
}

/// Remaining work per deliverable: required minus linked completions.
pub fn work_items_from_deliverables(
    deliverables: &[Deliverable],
    events: &[ExecutionEvent],
    policy: &ConstraintPolicy,
) -> Vec<WorkItem> {
    deliverables
        .iter()
        .map(|d| {
            let done = d.linked_completions(events, None, policy.zone).count();
            let done = u32::try_from(done).unwrap_or(u32::MAX);
            WorkItem {
                id: d.id.clone(),
                title: d.title.clone(),
                blocks_remaining: d.required_blocks.saturating_sub(done),
                must_finish_by: d.must_finish_by,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeasibilityStatus {
    Feasible,
    /// Feasible, but today's quota is not yet met.
    Required,
    Infeasible,
}

impl FeasibilityStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Feasible => "FEASIBLE",
            Self::Required => "REQUIRED",
            Self::Infeasible => "INFEASIBLE",
        }
    }
}

impl fmt::Display for FeasibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeasibilityReason {
    DeadlinePassed,
    GoalHasNoRemainingWork,
    NoWorkableDays,
    TodayCapacityZero,
    TodayNotWorkable,
    InsufficientCapacity,
    BehindRequiredPace,
    Ok,
    SubdeadlineInfeasible,
}

/// How far short the plan is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeasibilityDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks_short: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_blocks_per_day: Option<u32>,
}

/// Capacity check for work due by one must-finish-by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDeadline {
    pub must_finish_by: DayKey,
    /// Blocks due on or before this date.
    pub remaining_blocks: u32,
    pub workable_days_remaining: u32,
    pub capacity: u32,
    pub required_blocks_per_day: u32,
    pub feasible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub goal_id: String,
    pub now: DateTime<Utc>,
    pub deadline: DayKey,
    pub status: FeasibilityStatus,
    pub reasons: Vec<FeasibilityReason>,
    pub remaining_blocks_total: u32,
    pub workable_days_remaining: u32,
    pub required_blocks_per_day: Option<u32>,
    pub required_blocks_today: Option<u32>,
    pub completed_blocks_today: u32,
    pub delta: FeasibilityDelta,
    #[serde(default)]
    pub sub_deadlines: Vec<SubDeadline>,
    /// Net capacity per day from today through the deadline.
    #[serde(default)]
    pub capacity_schedule: BTreeMap<DayKey, u32>,
}

impl FeasibilityResult {
    pub fn is_infeasible(&self) -> bool {
        self.status == FeasibilityStatus::Infeasible
    }
}

/// Everything a feasibility check reads.
#[derive(Debug, Clone, Copy)]
pub struct FeasibilityRequest<'a> {
    pub goal_id: &'a str,
    /// Last calendar day work may count on.
    pub deadline: DayKey,
    pub work_items: &'a [WorkItem],
    pub events: &'a [ExecutionEvent],
    pub policy: &'a ConstraintPolicy,
    /// Daily cap used when the policy names none.
    pub fallback_cap: u32,
    pub now: DateTime<Utc>,
}

/// Net capacity for each day from `start` through `end` inclusive.
pub fn capacity_schedule(
    start: DayKey,
    end: DayKey,
    policy: &ConstraintPolicy,
    fallback_cap: u32,
) -> BTreeMap<DayKey, u32> {
    start
        .through(end)
        .map(|day| (day, policy.net_capacity(day, fallback_cap)))
        .collect()
}

/// Completed goal events attributed to `day`.
pub fn completed_on(events: &[ExecutionEvent], goal_id: &str, day: DayKey, policy: &ConstraintPolicy) -> u32 {
    let count = events
        .iter()
        .filter(|e| {
            e.is_completion()
                && e.goal_id.as_deref() == Some(goal_id)
                && e.effective_day(policy.zone) == Some(day)
        })
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn div_ceil(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { a.div_ceil(b) }
}

/// Evaluate whether the remaining work fits before the deadline.
pub fn compute_feasibility(req: &FeasibilityRequest<'_>) -> FeasibilityResult {
    let policy = req.policy;
    let today = DayKey::from_instant(req.now, policy.zone);
    let remaining: u32 = req.work_items.iter().map(|w| w.blocks_remaining).sum();
    let completed_today = completed_on(req.events, req.goal_id, today, policy);

    let mut result = FeasibilityResult {
        goal_id: req.goal_id.to_string(),
        now: req.now,
        deadline: req.deadline,
        status: FeasibilityStatus::Feasible,
        reasons: Vec::new(),
        remaining_blocks_total: remaining,
        workable_days_remaining: 0,
        required_blocks_per_day: None,
        required_blocks_today: None,
        completed_blocks_today: completed_today,
        delta: FeasibilityDelta::default(),
        sub_deadlines: Vec::new(),
        capacity_schedule: BTreeMap::new(),
    };

    // The deadline day itself is still usable; it passes at the next midnight.
    let deadline_passed = req.now >= day_start(req.deadline.add_days(1), policy.zone);
    if deadline_passed && remaining > 0 {
        result.status = FeasibilityStatus::Infeasible;
        result.reasons.push(FeasibilityReason::DeadlinePassed);
        return result;
    }
    if remaining == 0 {
        result.reasons.push(FeasibilityReason::GoalHasNoRemainingWork);
        result.required_blocks_per_day = Some(0);
        result.required_blocks_today = Some(0);
        return result;
    }

    let schedule = capacity_schedule(today, req.deadline, policy, req.fallback_cap);
    let total_capacity: u32 = schedule.values().sum();
    let workable_days = u32::try_from(schedule.values().filter(|c| **c > 0).count()).unwrap_or(u32::MAX);
    result.workable_days_remaining = workable_days;

    if workable_days == 0 {
        result.status = FeasibilityStatus::Infeasible;
        result.reasons.push(FeasibilityReason::NoWorkableDays);
        result.capacity_schedule = schedule;
        return result;
    }

    let per_day = div_ceil(remaining, workable_days);
    result.required_blocks_per_day = Some(per_day);

    if schedule.get(&today).copied().unwrap_or(0) == 0 {
        result.reasons.push(FeasibilityReason::TodayCapacityZero);
        if !policy.is_workable(today) {
            result.reasons.push(FeasibilityReason::TodayNotWorkable);
        }
    }

    if total_capacity < remaining {
        let short = remaining - total_capacity;
        result.delta = FeasibilityDelta {
            blocks_short: Some(short),
            extra_blocks_per_day: Some(div_ceil(short, workable_days)),
        };
        result.reasons.push(FeasibilityReason::InsufficientCapacity);
        result.status = FeasibilityStatus::Infeasible;
    }

    let required_today = per_day.saturating_sub(completed_today);
    result.required_blocks_today = Some(required_today);
    if result.status != FeasibilityStatus::Infeasible {
        if required_today > 0 {
            result.reasons.push(FeasibilityReason::BehindRequiredPace);
            result.status = FeasibilityStatus::Required;
        } else {
            result.reasons.push(FeasibilityReason::Ok);
        }
    }

    result.sub_deadlines = sub_deadlines(req.work_items, today, req.deadline, &schedule);
    if result.sub_deadlines.iter().any(|s| !s.feasible) {
        result.reasons.push(FeasibilityReason::SubdeadlineInfeasible);
        result.status = FeasibilityStatus::Infeasible;
    }

    result.capacity_schedule = schedule;
    result
}

/// Cumulative capacity checks for every must-finish-by date up to the deadline.
fn sub_deadlines(
    items: &[WorkItem],
    today: DayKey,
    deadline: DayKey,
    schedule: &BTreeMap<DayKey, u32>,
) -> Vec<SubDeadline> {
    let mut due: BTreeMap<DayKey, u32> = BTreeMap::new();
    for item in items {
        let Some(date) = item.must_finish_by else {
            continue;
        };
        if date > deadline || item.blocks_remaining == 0 {
            continue;
        }
        *due.entry(date).or_default() += item.blocks_remaining;
    }

    let mut cumulative = 0;
    due.into_iter()
        .map(|(date, blocks)| {
            cumulative += blocks;
            let window = schedule.range(today..=date.max(today));
            let (capacity, days) = if date < today {
                (0, 0)
            } else {
                window.fold((0u32, 0u32), |(cap, days), (_, c)| {
                    (cap + c, days + u32::from(*c > 0))
                })
            };
            SubDeadline {
                must_finish_by: date,
                remaining_blocks: cumulative,
                workable_days_remaining: days,
                capacity,
                required_blocks_per_day: div_ceil(cumulative, days),
                feasible: days > 0 && capacity >= cumulative,
            }
        })
        .collect()
}
