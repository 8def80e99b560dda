//! Goal admission gate.
//!
//! Runs once per goal definition. Checks structure, then constraints, then
//! the deadline and the plan proof. Only an admitted goal may be scheduled,
//! scored or credited, and callers re-check [`AdmissionResult::is_admitted`]
//! on every recomputation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintPolicy;
use crate::plan_proof::{GoalEquation, MechanismClass, PlanProof, ProofReason, derive_plan_proof};
use crate::scheduler::{
    AutoAsanaPlan, BusyInterval, Conflict, ConflictCode, RecoveryOption, ScheduleRequest, compile_auto_plan,
};
use crate::time::DayKey;

/// Pipeline goals need at least this many days of lead time.
pub const MIN_PIPELINE_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionStatus {
    Admitted,
    RejectedNoMechanism,
    RejectedMissingConstraints,
    RejectedInfeasible,
}

impl AdmissionStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Admitted => "ADMITTED",
            Self::RejectedNoMechanism => "REJECTED_NO_MECHANISM",
            Self::RejectedMissingConstraints => "REJECTED_MISSING_CONSTRAINTS",
            Self::RejectedInfeasible => "REJECTED_INFEASIBLE",
        }
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionReason {
    MissingGoalFamily,
    MissingNumericTarget,
    MissingDeadline,
    MissingMechanismClass,
    MissingConstraints,
    DeadlinePassed,
    NoWorkableDays,
    MaxPerDayZero,
    RequiredPaceExceedsMaxPerDay,
    RequiredPaceExceedsMaxPerWeek,
    MinPipelineYearsExceedTimeAvailable,
    UnschedulableForbiddenWindows,
    UnschedulableOverlapExistingBlocks,
    UnschedulableCapacityConsumed,
    UnschedulableHorizonTooSmall,
}

impl AdmissionReason {
    /// Admission reason for a scheduler conflict code, if it has one.
    pub fn from_conflict(code: ConflictCode) -> Option<Self> {
        match code {
            ConflictCode::NoAllowedWindows => Some(Self::UnschedulableForbiddenWindows),
            ConflictCode::OverlapAllSlots => Some(Self::UnschedulableOverlapExistingBlocks),
            ConflictCode::ExceedsMaxPerDay | ConflictCode::ExceedsMaxPerWeek => {
                Some(Self::UnschedulableCapacityConsumed)
            }
            ConflictCode::NoWorkableDays => Some(Self::UnschedulableHorizonTooSmall),
            ConflictCode::Unschedulable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulabilityStatus {
    Schedulable,
    Unschedulable,
}

/// Whether an admitted goal fits the calendar as it stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedulability {
    pub status: SchedulabilityStatus,
    pub reasons: Vec<AdmissionReason>,
    pub conflicts: Vec<Conflict>,
    pub recovery_options: Vec<RecoveryOption>,
}

impl Schedulability {
    pub fn from_plan(plan: &AutoAsanaPlan) -> Self {
        let mut reasons = Vec::new();
        for code in plan.conflict_codes() {
            if let Some(reason) = AdmissionReason::from_conflict(code) {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
        let status = if reasons.is_empty() {
            SchedulabilityStatus::Schedulable
        } else {
            SchedulabilityStatus::Unschedulable
        };
        Self {
            status,
            reasons,
            conflicts: plan.conflicts.clone(),
            recovery_options: plan.recovery_options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionResult {
    pub status: AdmissionStatus,
    pub reasons: Vec<AdmissionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_proof: Option<PlanProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedulability: Option<Schedulability>,
}

impl AdmissionResult {
    fn rejected(status: AdmissionStatus, reasons: Vec<AdmissionReason>) -> Self {
        Self {
            status,
            reasons,
            plan_proof: None,
            schedulability: None,
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.status == AdmissionStatus::Admitted
    }
}

/// Whether an optional admission record admits its goal.
pub fn is_admitted(admission: Option<&AdmissionResult>) -> bool {
    admission.is_some_and(AdmissionResult::is_admitted)
}

/// Context the gate evaluates a goal in.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext<'a> {
    pub goal_id: &'a str,
    pub cycle_id: &'a str,
    pub now: DateTime<Utc>,
    pub policy: &'a ConstraintPolicy,
    pub horizon_days: u32,
    pub accepted: &'a [BusyInterval],
}

fn structural_reasons(eq: &GoalEquation) -> Vec<AdmissionReason> {
    let mut reasons = Vec::new();
    if eq.family.is_none() {
        reasons.push(AdmissionReason::MissingGoalFamily);
    }
    let target_ok = eq.objective.is_some() && eq.objective_value.is_some_and(|v| v.is_finite() && v > 0.0);
    if !target_ok {
        reasons.push(AdmissionReason::MissingNumericTarget);
    }
    if eq.deadline.is_none() {
        reasons.push(AdmissionReason::MissingDeadline);
    }
    if eq.mechanism_class.is_none() {
        reasons.push(AdmissionReason::MissingMechanismClass);
    }
    reasons
}

fn has_constraints(eq: &GoalEquation) -> bool {
    eq.max_daily_work_minutes.is_some() && eq.work_days_per_week.is_some() && eq.weekends_allowed.is_some()
}

fn infeasibility_reasons(eq: &GoalEquation, proof: &PlanProof, today: DayKey, deadline: DayKey) -> Vec<AdmissionReason> {
    let mut reasons = Vec::new();
    if proof.workable_days_remaining == 0 {
        reasons.push(AdmissionReason::NoWorkableDays);
    }
    if proof.reasons.contains(&ProofReason::MaxPerDayZero) {
        reasons.push(AdmissionReason::MaxPerDayZero);
    }
    if proof.reasons.contains(&ProofReason::RequiredPaceExceedsMax) {
        reasons.push(AdmissionReason::RequiredPaceExceedsMaxPerDay);
    }
    let week_days = if eq.weekends_allowed.unwrap_or(true) { 7.0 } else { 5.0 };
    let weekly_need = proof.required_pace_per_day * week_days;
    if proof.max_per_week > 0 && weekly_need > f64::from(proof.max_per_week) {
        reasons.push(AdmissionReason::RequiredPaceExceedsMaxPerWeek);
    }
    if eq.mechanism_class == Some(MechanismClass::Pipeline) {
        let span = today.days_until(deadline) + 1;
        if span < i64::from(MIN_PIPELINE_DAYS) {
            reasons.push(AdmissionReason::MinPipelineYearsExceedTimeAvailable);
        }
    }
    reasons
}

/// Run the admission gate for `equation`.
pub fn admit_goal(equation: Option<&GoalEquation>, ctx: &AdmissionContext<'_>) -> AdmissionResult {
    let result = evaluate(equation, ctx);
    tracing::info!(
        goal_id = ctx.goal_id,
        status = %result.status,
        reasons = ?result.reasons,
        "goal admission decided"
    );
    result
}

fn evaluate(equation: Option<&GoalEquation>, ctx: &AdmissionContext<'_>) -> AdmissionResult {
    let Some(eq) = equation else {
        return AdmissionResult::rejected(
            AdmissionStatus::RejectedNoMechanism,
            vec![AdmissionReason::MissingMechanismClass],
        );
    };

    let structural = structural_reasons(eq);
    if !structural.is_empty() {
        return AdmissionResult::rejected(AdmissionStatus::RejectedNoMechanism, structural);
    }
    if !has_constraints(eq) {
        return AdmissionResult::rejected(
            AdmissionStatus::RejectedMissingConstraints,
            vec![AdmissionReason::MissingConstraints],
        );
    }

    let today = DayKey::from_instant(ctx.now, ctx.policy.zone);
    let Some(deadline) = eq.deadline else {
        return AdmissionResult::rejected(
            AdmissionStatus::RejectedNoMechanism,
            vec![AdmissionReason::MissingDeadline],
        );
    };
    if deadline <= today {
        return AdmissionResult::rejected(
            AdmissionStatus::RejectedInfeasible,
            vec![AdmissionReason::DeadlinePassed],
        );
    }

    let proof = derive_plan_proof(eq, today);
    let reasons = infeasibility_reasons(eq, &proof, today, deadline);
    if !reasons.is_empty() || !proof.is_feasible() {
        let reasons = if reasons.is_empty() {
            vec![AdmissionReason::NoWorkableDays]
        } else {
            reasons
        };
        return AdmissionResult {
            status: AdmissionStatus::RejectedInfeasible,
            reasons,
            plan_proof: Some(proof),
            schedulability: None,
        };
    }

    let plan = compile_auto_plan(&ScheduleRequest {
        goal_id: ctx.goal_id,
        cycle_id: ctx.cycle_id,
        plan_proof: &proof,
        policy: ctx.policy,
        now: ctx.now,
        horizon_days: ctx.horizon_days,
        accepted: ctx.accepted,
    });
    AdmissionResult {
        status: AdmissionStatus::Admitted,
        reasons: Vec::new(),
        schedulability: Some(Schedulability::from_plan(&plan)),
        plan_proof: Some(proof),
    }
}
