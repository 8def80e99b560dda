//! Constraint-based auto-scheduler.
//!
//! Turns a plan proof into concrete work sessions across a short horizon of
//! workable days. Each session is placed at the first 15-minute step inside
//! the allowed windows that overlaps nothing already accepted or placed,
//! subject to running per-day and per-ISO-week caps. Sessions that cannot be
//! placed are reported as typed conflicts with machine-checkable remedies.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::{ConstraintPolicy, MINUTES_PER_DAY, TimeWindow};
use crate::plan_proof::PlanProof;
use crate::time::{ClockTime, DayKey, build_local_start, minutes_of_day};

pub const POLICY_VERSION: &str = "auto_asana_v1.1";

/// Default horizon length in days.
pub const DEFAULT_HORIZON_DAYS: u32 = 14;

/// Candidate start times advance in steps of this many minutes.
const SLOT_STEP_MINUTES: u32 = 15;

const MIN_SESSION_MINUTES: u32 = 15;
const DEFAULT_SESSION_MINUTES: u32 = 60;

// ═══════════════════════════════════════════════════════════════════════
// Conflicts
// ═══════════════════════════════════════════════════════════════════════

/// Why a session (or the plan as a whole) could not be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictCode {
    NoAllowedWindows,
    OverlapAllSlots,
    ExceedsMaxPerDay,
    ExceedsMaxPerWeek,
    NoWorkableDays,
    Unschedulable,
}

impl ConflictCode {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::NoAllowedWindows => "NO_ALLOWED_WINDOWS",
            Self::OverlapAllSlots => "OVERLAP_ALL_SLOTS",
            Self::ExceedsMaxPerDay => "EXCEEDS_MAX_PER_DAY",
            Self::ExceedsMaxPerWeek => "EXCEEDS_MAX_PER_WEEK",
            Self::NoWorkableDays => "NO_WORKABLE_DAYS",
            Self::Unschedulable => "UNSCHEDULABLE",
        }
    }
}

impl fmt::Display for ConflictCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A machine-checkable way out of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemedyKind {
    RelaxWorkingHours,
    ExtendHorizon,
    IncreaseMaxPerDay,
    IncreaseMaxPerWeek,
    ExtendDeadline,
    ReduceScope,
    RemoveBlackouts,
    AdjustWorkableDays,
    AdjustConstraints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub code: ConflictCode,
    pub detail: String,
    /// Draft that failed; absent for plan-wide conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<DayKey>,
    pub remedies: Vec<RemedyKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOption {
    pub kind: RemedyKind,
    pub detail: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Plan
// ═══════════════════════════════════════════════════════════════════════

/// One placed work session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonBlock {
    pub id: String,
    pub day: DayKey,
    pub start: DateTime<Utc>,
    pub minutes: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: DayKey,
    pub end: DayKey,
    pub workable_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAudit {
    pub generated_at: DateTime<Utc>,
    pub goal_id: String,
    pub cycle_id: String,
    pub policy_version: String,
}

/// A proposed schedule for one goal. Produced fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoAsanaPlan {
    pub horizon: Horizon,
    pub blocks: Vec<HorizonBlock>,
    pub conflicts: Vec<Conflict>,
    pub recovery_options: Vec<RecoveryOption>,
    pub audit: PlanAudit,
}

impl AutoAsanaPlan {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Distinct conflict codes in first-seen order.
    pub fn conflict_codes(&self) -> Vec<ConflictCode> {
        let mut codes = Vec::new();
        for c in &self.conflicts {
            if !codes.contains(&c.code) {
                codes.push(c.code);
            }
        }
        codes
    }
}

/// An interval already on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub minutes: u32,
}

/// Everything the scheduler reads.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRequest<'a> {
    pub goal_id: &'a str,
    pub cycle_id: &'a str,
    pub plan_proof: &'a PlanProof,
    pub policy: &'a ConstraintPolicy,
    pub now: DateTime<Utc>,
    pub horizon_days: u32,
    pub accepted: &'a [BusyInterval],
}

struct Draft {
    id: String,
}

/// Running state while drafts are placed.
struct Ledgerbook {
    busy: BTreeMap<DayKey, Vec<TimeWindow>>,
    daily: BTreeMap<DayKey, u32>,
    weekly: BTreeMap<String, u32>,
}

impl Ledgerbook {
    fn seeded(accepted: &[BusyInterval], policy: &ConstraintPolicy) -> Self {
        let mut book = Self {
            busy: BTreeMap::new(),
            daily: BTreeMap::new(),
            weekly: BTreeMap::new(),
        };
        for interval in accepted {
            let day = DayKey::from_instant(interval.start, policy.zone);
            let start_min = minutes_of_day(interval.start, policy.zone);
            let end_min = (start_min + interval.minutes).min(MINUTES_PER_DAY);
            book.record(day, TimeWindow::new(start_min, end_min));
        }
        book
    }

    fn record(&mut self, day: DayKey, window: TimeWindow) {
        self.busy.entry(day).or_default().push(window);
        *self.daily.entry(day).or_default() += 1;
        *self.weekly.entry(day.iso_week_key()).or_default() += 1;
    }

    fn overlaps(&self, day: DayKey, candidate: &TimeWindow) -> bool {
        self.busy
            .get(&day)
            .is_some_and(|busy| busy.iter().any(|b| b.overlaps(candidate)))
    }
}

/// Session length for a policy: at least 15 minutes, 60 by default.
pub fn session_minutes(policy: &ConstraintPolicy) -> u32 {
    policy
        .min_session_minutes
        .unwrap_or(DEFAULT_SESSION_MINUTES)
        .max(MIN_SESSION_MINUTES)
}

/// Build the auto-plan for one goal.
pub fn compile_auto_plan(req: &ScheduleRequest<'_>) -> AutoAsanaPlan {
    let policy = req.policy;
    let proof = req.plan_proof;
    let start = DayKey::from_instant(req.now, policy.zone);
    let end = start.add_days(i64::from(req.horizon_days.max(1)) - 1);
    let days: Vec<DayKey> = start.through(end).filter(|d| policy.is_schedulable(*d)).collect();

    let required_per_day = proof.required_sessions_per_day();
    let sessions_per_day = proof.max_per_day.min(required_per_day);
    let minutes = session_minutes(policy);
    let allowed = policy.allowed_windows();
    let day_cap = policy.max_blocks_per_day.unwrap_or(u32::MAX);
    let week_cap = policy.max_blocks_per_week;

    let drafts: Vec<Draft> = days
        .iter()
        .flat_map(|day| {
            (0..sessions_per_day).map(move |idx| Draft {
                id: format!("blk-auto-{}-{day}-{idx}", req.cycle_id),
            })
        })
        .collect();

    let mut book = Ledgerbook::seeded(req.accepted, policy);
    let mut blocks = Vec::new();
    let mut conflicts = Vec::new();
    let mut recovery_options: Vec<RecoveryOption> = Vec::new();

    for draft in &drafts {
        match place(draft, &days, &allowed, minutes, day_cap, week_cap, policy, &mut book) {
            Ok(block) => blocks.push(block),
            Err(conflict) => {
                tracing::debug!(
                    block_id = %draft.id,
                    code = %conflict.code,
                    "draft session could not be placed"
                );
                for remedy in &conflict.remedies {
                    let option = RecoveryOption {
                        kind: *remedy,
                        detail: conflict.detail.clone(),
                    };
                    if !recovery_options.iter().any(|r| r.kind == option.kind) {
                        recovery_options.push(option);
                    }
                }
                conflicts.push(conflict);
            }
        }
    }

    if proof.max_per_day > 0 && required_per_day > proof.max_per_day {
        conflicts.push(Conflict {
            code: ConflictCode::ExceedsMaxPerDay,
            detail: format!(
                "Required {required_per_day} blocks/day exceeds max {}.",
                proof.max_per_day
            ),
            block_id: None,
            day: None,
            remedies: vec![
                RemedyKind::IncreaseMaxPerDay,
                RemedyKind::ExtendDeadline,
                RemedyKind::ReduceScope,
            ],
        });
    }
    let weekly_need = (proof.required_pace_per_day * f64::from(policy.workable_weekday_count())).ceil();
    if proof.max_per_week > 0 && weekly_need > f64::from(proof.max_per_week) {
        conflicts.push(Conflict {
            code: ConflictCode::ExceedsMaxPerWeek,
            detail: format!(
                "Required {weekly_need} blocks/week exceeds max {}.",
                proof.max_per_week
            ),
            block_id: None,
            day: None,
            remedies: vec![
                RemedyKind::IncreaseMaxPerWeek,
                RemedyKind::ExtendDeadline,
                RemedyKind::ReduceScope,
            ],
        });
    }
    if days.is_empty() {
        conflicts.push(Conflict {
            code: ConflictCode::NoWorkableDays,
            detail: "No workable days in horizon under current constraints.".into(),
            block_id: None,
            day: None,
            remedies: vec![RemedyKind::RemoveBlackouts, RemedyKind::AdjustWorkableDays],
        });
    }
    if !conflicts.is_empty() {
        recovery_options.push(RecoveryOption {
            kind: RemedyKind::AdjustConstraints,
            detail: "Increase capacity or widen workable days.".into(),
        });
    }

    AutoAsanaPlan {
        horizon: Horizon {
            start,
            end,
            workable_days: u32::try_from(days.len()).unwrap_or(u32::MAX),
        },
        blocks,
        conflicts,
        recovery_options,
        audit: PlanAudit {
            generated_at: req.now,
            goal_id: req.goal_id.to_string(),
            cycle_id: req.cycle_id.to_string(),
            policy_version: POLICY_VERSION.to_string(),
        },
    }
}

/// Find the first legal slot for `draft`, scanning every horizon day from the
/// earliest. A policy without a day cap never fails on the day cap.
#[allow(clippy::too_many_arguments)]
fn place(
    draft: &Draft,
    days: &[DayKey],
    allowed: &[TimeWindow],
    minutes: u32,
    day_cap: u32,
    week_cap: Option<u32>,
    policy: &ConstraintPolicy,
    book: &mut Ledgerbook,
) -> Result<HorizonBlock, Conflict> {
    let mut cap_failure: Option<(ConflictCode, DayKey)> = None;
    let mut examined = false;
    let mut free_found = false;

    if !allowed.is_empty() {
        for &day in days {
            if book.daily.get(&day).copied().unwrap_or(0) >= day_cap {
                cap_failure = Some((ConflictCode::ExceedsMaxPerDay, day));
                continue;
            }
            if let Some(cap) = week_cap {
                if book.weekly.get(&day.iso_week_key()).copied().unwrap_or(0) >= cap {
                    cap_failure = Some((ConflictCode::ExceedsMaxPerWeek, day));
                    continue;
                }
            }
            for window in allowed {
                let mut start_min = window.start_min;
                while start_min + minutes <= window.end_min {
                    let candidate = TimeWindow::new(start_min, start_min + minutes);
                    start_min += SLOT_STEP_MINUTES;
                    examined = true;
                    if book.overlaps(day, &candidate) {
                        continue;
                    }
                    free_found = true;
                    let clock = ClockTime::from_minutes_of_day(candidate.start_min);
                    let Ok(start) = build_local_start(day, clock, policy.zone) else {
                        continue;
                    };
                    book.record(day, candidate);
                    return Ok(HorizonBlock {
                        id: draft.id.clone(),
                        day,
                        start,
                        minutes,
                        title: "Auto Asana Execution".into(),
                    });
                }
            }
        }
    }

    let (code, day, remedy, detail) = if allowed.is_empty() {
        (
            ConflictCode::NoAllowedWindows,
            None,
            RemedyKind::RelaxWorkingHours,
            "Add working-hour windows.".to_string(),
        )
    } else if examined && !free_found {
        (
            ConflictCode::OverlapAllSlots,
            None,
            RemedyKind::ExtendHorizon,
            "Extend horizon to find free slots.".to_string(),
        )
    } else if let Some((code, day)) = cap_failure {
        let (remedy, cap) = match code {
            ConflictCode::ExceedsMaxPerWeek => (RemedyKind::IncreaseMaxPerWeek, week_cap.unwrap_or(0)),
            _ => (RemedyKind::IncreaseMaxPerDay, day_cap),
        };
        (code, Some(day), remedy, format!("Increase the cap above {cap}."))
    } else {
        (
            ConflictCode::Unschedulable,
            None,
            RemedyKind::ExtendHorizon,
            "Extend horizon or reduce sessions.".to_string(),
        )
    };
    Err(Conflict {
        code,
        detail,
        block_id: Some(draft.id.clone()),
        day,
        remedies: vec![remedy],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_proof::{GoalEquation, Objective, derive_plan_proof};
    use crate::time::parse_instant;

    fn dk(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    /// One session a day for ten days, at most two a day.
    fn proof(units: f64, max_minutes: u32) -> PlanProof {
        let eq = GoalEquation {
            objective: Some(Objective::PracticeHoursTotal),
            objective_value: Some(units),
            deadline: Some(dk("2026-03-19")),
            work_days_per_week: Some(7),
            max_daily_work_minutes: Some(max_minutes),
            weekends_allowed: Some(true),
            ..Default::default()
        };
        derive_plan_proof(&eq, dk("2026-03-10"))
    }

    fn policy() -> ConstraintPolicy {
        let mut p = ConstraintPolicy::in_zone(chrono_tz::UTC);
        p.working_hours = vec![TimeWindow::new(9 * 60, 12 * 60)];
        p
    }

    fn plan(proof: &PlanProof, policy: &ConstraintPolicy, accepted: &[BusyInterval], horizon: u32) -> AutoAsanaPlan {
        compile_auto_plan(&ScheduleRequest {
            goal_id: "g1",
            cycle_id: "c1",
            plan_proof: proof,
            policy,
            now: parse_instant("2026-03-10T06:00:00Z").unwrap(),
            horizon_days: horizon,
            accepted,
        })
    }

    fn window_of(block: &HorizonBlock) -> TimeWindow {
        let start = minutes_of_day(block.start, chrono_tz::UTC);
        TimeWindow::new(start, start + block.minutes)
    }

    // ── Placement ──

    #[test]
    fn places_one_session_per_day_inside_working_hours() {
        let mut p = policy();
        p.max_blocks_per_day = Some(1);
        let plan = plan(&proof(10.0, 120), &p, &[], 7);
        assert_eq!(plan.blocks.len(), 7);
        assert!(!plan.has_conflicts());
        for block in &plan.blocks {
            assert!(TimeWindow::new(540, 720).contains(&window_of(block)));
            assert_eq!(block.start, build_local_start(block.day, ClockTime::new(9, 0), p.zone).unwrap());
        }
        assert_eq!(plan.blocks[0].id, "blk-auto-c1-2026-03-10-0");
        assert_eq!(plan.audit.policy_version, POLICY_VERSION);
    }

    #[test]
    fn placements_never_overlap_accepted_or_each_other() {
        let mut p = policy();
        p.max_blocks_per_day = Some(2);
        let accepted = [BusyInterval {
            start: parse_instant("2026-03-10T09:00:00Z").unwrap(),
            minutes: 90,
        }];
        let plan = plan(&proof(20.0, 120), &p, &accepted, 3);
        let first_day: Vec<_> = plan.blocks.iter().filter(|b| b.day == dk("2026-03-10")).collect();
        assert_eq!(first_day.len(), 1, "day cap of 2 includes the accepted block");
        assert_eq!(window_of(first_day[0]), TimeWindow::new(630, 690));

        for (i, a) in plan.blocks.iter().enumerate() {
            for b in &plan.blocks[i + 1..] {
                assert!(a.day != b.day || !window_of(a).overlaps(&window_of(b)));
            }
        }
    }

    #[test]
    fn earlier_days_fill_to_the_cap_first() {
        let mut p = policy();
        p.max_blocks_per_day = Some(3);
        let plan = plan(&proof(10.0, 120), &p, &[], 3);
        assert_eq!(plan.blocks.len(), 3);
        assert!(plan.blocks.iter().all(|b| b.day == dk("2026-03-10")));
        let starts: Vec<u32> = plan.blocks.iter().map(|b| window_of(b).start_min).collect();
        assert_eq!(starts, [540, 600, 660]);
        // Drafts are named for their nominal day even when placed earlier.
        assert_eq!(plan.blocks[2].id, "blk-auto-c1-2026-03-12-0");
    }

    #[test]
    fn no_policy_cap_packs_the_first_day() {
        let p = policy();
        let plan = plan(&proof(10.0, 120), &p, &[], 5);
        let per_day = |d: &str| plan.blocks.iter().filter(|b| b.day == dk(d)).count();
        assert_eq!(plan.blocks.len(), 5);
        assert_eq!(per_day("2026-03-10"), 3);
        assert_eq!(per_day("2026-03-11"), 2);
        assert!(!plan.has_conflicts());
    }

    #[test]
    fn forbidden_windows_are_respected() {
        let mut p = policy();
        p.forbidden_windows = vec![TimeWindow::new(540, 600)];
        let plan = plan(&proof(10.0, 120), &p, &[], 2);
        assert!(plan.blocks.iter().all(|b| window_of(b).start_min >= 600));
    }

    // ── Conflicts ──

    #[test]
    fn no_allowed_windows() {
        let mut p = policy();
        p.forbidden_windows = vec![TimeWindow::new(0, 1440)];
        let plan = plan(&proof(10.0, 120), &p, &[], 3);
        assert!(plan.blocks.is_empty());
        assert_eq!(plan.conflict_codes(), [ConflictCode::NoAllowedWindows]);
        assert!(plan.recovery_options.iter().any(|r| r.kind == RemedyKind::RelaxWorkingHours));
        assert!(plan.recovery_options.iter().any(|r| r.kind == RemedyKind::AdjustConstraints));
    }

    #[test]
    fn overlap_all_slots_when_calendar_is_full() {
        let p = policy();
        let accepted = [BusyInterval {
            start: parse_instant("2026-03-10T09:00:00Z").unwrap(),
            minutes: 180,
        }];
        let mut p1 = p.clone();
        p1.max_blocks_per_day = Some(5);
        let plan = plan(&proof(1.0, 120), &p1, &accepted, 1);
        assert_eq!(plan.conflict_codes(), [ConflictCode::OverlapAllSlots]);
    }

    #[test]
    fn day_cap_conflict_when_slots_are_exhausted_by_caps() {
        let mut p = policy();
        p.max_blocks_per_day = Some(1);
        let accepted = [BusyInterval {
            start: parse_instant("2026-03-10T11:00:00Z").unwrap(),
            minutes: 30,
        }];
        let plan = plan(&proof(1.0, 120), &p, &accepted, 1);
        assert_eq!(plan.conflict_codes(), [ConflictCode::ExceedsMaxPerDay]);
        assert_eq!(plan.conflicts[0].day, Some(dk("2026-03-10")));
    }

    #[test]
    fn week_cap_limits_placements() {
        let mut p = policy();
        p.max_blocks_per_week = Some(3);
        // 2026-03-09 is a Monday; horizon covers Tue..Sun of that week.
        let plan = plan(&proof(10.0, 120), &p, &[], 6);
        assert_eq!(plan.blocks.len(), 3);
        assert!(plan.conflict_codes().contains(&ConflictCode::ExceedsMaxPerWeek));
    }

    #[test]
    fn global_conflicts() {
        let p = policy();
        // 30 units in 10 days at 1 block/day max.
        let plan = plan(&proof(30.0, 60), &p, &[], 3);
        assert!(plan.conflict_codes().contains(&ConflictCode::ExceedsMaxPerDay));

        let mut blackout = policy();
        blackout.blackout_dates = dk("2026-03-10").through(dk("2026-03-12")).collect();
        let plan = compile_auto_plan(&ScheduleRequest {
            goal_id: "g1",
            cycle_id: "c1",
            plan_proof: &proof(10.0, 120),
            policy: &blackout,
            now: parse_instant("2026-03-10T06:00:00Z").unwrap(),
            horizon_days: 3,
            accepted: &[],
        });
        assert_eq!(plan.horizon.workable_days, 0);
        assert_eq!(plan.conflict_codes(), [ConflictCode::NoWorkableDays]);
    }

    #[test]
    fn compile_is_deterministic() {
        let p = policy();
        let a = plan(&proof(15.0, 120), &p, &[], 14);
        let b = plan(&proof(15.0, 120), &p, &[], 14);
        assert_eq!(a, b);
    }
}
