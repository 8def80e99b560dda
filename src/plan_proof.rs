//! Goal equations and the plan proof derived from them.
//!
//! A [`GoalEquation`] is the structured statement of a goal: what is being
//! measured, how much, by when, and how much daily effort is available. The
//! [`PlanProof`] is its arithmetic consequence: pace, ceilings and slack.
//! Proofs are recomputed on demand and never stored incrementally.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::DayKey;

// ═══════════════════════════════════════════════════════════════════════
// Goal equation
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalFamily {
    Body,
    Skill,
    Output,
}

/// How work converts into progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MechanismClass {
    /// Each session adds a unit.
    Throughput,
    /// Long-lead pipeline; needs at least a year.
    Pipeline,
    /// Dependency-ordered project.
    ProjectGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Objective {
    LoseWeightLbs,
    PracticeHoursTotal,
    PublishCount,
}

impl Objective {
    /// Minutes one block of work takes for this objective.
    pub fn block_minutes(&self) -> u32 {
        match self {
            Self::LoseWeightLbs => 45,
            Self::PracticeHoursTotal | Self::PublishCount => 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineType {
    #[default]
    Hard,
    Soft,
}

/// The structured statement of one goal.
///
/// Every field is optional so incomplete equations can reach the admission
/// gate and be rejected with a precise reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalEquation {
    pub label: Option<String>,
    pub family: Option<GoalFamily>,
    pub mechanism_class: Option<MechanismClass>,
    pub objective: Option<Objective>,
    pub objective_value: Option<f64>,
    pub deadline: Option<DayKey>,
    pub deadline_type: DeadlineType,
    pub work_days_per_week: Option<u32>,
    pub max_daily_work_minutes: Option<u32>,
    pub weekends_allowed: Option<bool>,
}

impl GoalEquation {
    /// Units the goal requires, 0 when unset.
    pub fn required_units(&self) -> f64 {
        self.objective_value.unwrap_or(0.0).max(0.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Plan proof
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofStatus {
    Feasible,
    Infeasible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofReason {
    MaxPerDayZero,
    RequiredPaceExceedsMax,
    RequiredUnitsZero,
}

impl fmt::Display for ProofReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MaxPerDayZero => "MAX_PER_DAY_ZERO",
            Self::RequiredPaceExceedsMax => "REQUIRED_PACE_EXCEEDS_MAX",
            Self::RequiredUnitsZero => "REQUIRED_UNITS_ZERO",
        };
        f.write_str(label)
    }
}

/// Arithmetic feasibility of a goal equation from a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProof {
    pub workable_days_remaining: u32,
    pub total_required_units: f64,
    pub required_pace_per_day: f64,
    pub max_per_day: u32,
    pub max_per_week: u32,
    pub slack_units: f64,
    pub slack_ratio: f64,
    pub intensity_ratio: f64,
    pub status: ProofStatus,
    pub reasons: Vec<ProofReason>,
}

impl PlanProof {
    pub fn is_feasible(&self) -> bool {
        self.status == ProofStatus::Feasible
    }

    /// Whole sessions per day the pace demands.
    pub fn required_sessions_per_day(&self) -> u32 {
        self.required_pace_per_day.max(0.0).ceil() as u32
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Days from `today` through `deadline` inclusive, skipping weekends when
/// they are disallowed. Never less than 1.
pub fn workable_days(today: DayKey, deadline: DayKey, weekends_allowed: bool) -> u32 {
    let count = today
        .through(deadline)
        .filter(|d| weekends_allowed || !d.is_weekend())
        .count();
    u32::try_from(count).unwrap_or(u32::MAX).max(1)
}

/// Derive the plan proof for `equation` as of `today`.
pub fn derive_plan_proof(equation: &GoalEquation, today: DayKey) -> PlanProof {
    let deadline = equation.deadline.unwrap_or(today);
    let days = workable_days(today, deadline, equation.weekends_allowed.unwrap_or(true));
    let units = equation.required_units();
    let pace = units / f64::from(days);

    let block_minutes = equation
        .objective
        .map(|o| o.block_minutes())
        .unwrap_or(60);
    let max_per_day = equation.max_daily_work_minutes.unwrap_or(0) / block_minutes;
    let max_per_week = max_per_day * equation.work_days_per_week.unwrap_or(5);

    let capacity = f64::from(max_per_day) * f64::from(days);
    let slack_units = capacity - units;
    let slack_ratio = if units > 0.0 {
        clamp01(slack_units / units)
    } else {
        0.0
    };
    let intensity_ratio = if max_per_day > 0 {
        clamp01(pace / f64::from(max_per_day))
    } else {
        1.0
    };

    let mut reasons = Vec::new();
    if max_per_day == 0 {
        reasons.push(ProofReason::MaxPerDayZero);
    } else if pace > f64::from(max_per_day) {
        reasons.push(ProofReason::RequiredPaceExceedsMax);
    }
    if units <= 0.0 {
        reasons.push(ProofReason::RequiredUnitsZero);
    }
    let status = if reasons.is_empty() {
        ProofStatus::Feasible
    } else {
        ProofStatus::Infeasible
    };

    PlanProof {
        workable_days_remaining: days,
        total_required_units: units,
        required_pace_per_day: pace,
        max_per_day,
        max_per_week,
        slack_units,
        slack_ratio,
        intensity_ratio,
        status,
        reasons,
    }
}
