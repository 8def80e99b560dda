//! Probability engine: how likely is the goal to finish on time?
//!
//! Two stages. A structural prior from the plan proof and the constraint
//! policy, capped at [`PRIOR_CAP`]. Then an evidence estimate from recent
//! completed throughput, modelled as a normal total over the remaining
//! workable days. The evidence estimate only stands alone once
//! [`EVIDENCE_THRESHOLD_DAYS`] days carry completions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintPolicy;
use crate::feasibility::FeasibilityResult;
use crate::ledger::ExecutionEvent;
use crate::plan_proof::PlanProof;
use crate::scheduler::ConflictCode;
use crate::time::DayKey;

/// Ceiling for any estimate not backed by enough evidence.
pub const PRIOR_CAP: f64 = 0.65;

/// Evidence days needed before the evidence estimate stands alone.
pub const EVIDENCE_THRESHOLD_DAYS: u32 = 7;

/// Multiplier applied while the plan has unresolved scheduling conflicts.
pub const UNSCHEDULABLE_PENALTY: f64 = 0.8;

pub const POLICY_VERSION: &str = "probability_v2";

/// Backwards day walk limit for rolling windows.
const MAX_LOOKBACK_DAYS: i64 = 3660;

// ═══════════════════════════════════════════════════════════════════════
// Window
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    #[default]
    CycleToDate,
    Rolling,
}

/// Which days feed the evidence series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbabilityWindow {
    pub mode: WindowMode,
    pub start: DayKey,
    pub end: DayKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
}

impl ProbabilityWindow {
    /// Cycle-to-date when the policy asks for it and a cycle start is
    /// known, else the rolling window.
    pub fn resolve(cycle_start: Option<DayKey>, now: DateTime<Utc>, policy: &ConstraintPolicy) -> Self {
        let end = DayKey::from_instant(now, policy.zone);
        match cycle_start {
            Some(start) if start <= end && policy.window_mode == WindowMode::CycleToDate => Self {
                mode: WindowMode::CycleToDate,
                start,
                end,
                window_days: None,
            },
            _ => {
                let days = policy.scoring_window_days.max(1);
                Self {
                    mode: WindowMode::Rolling,
                    start: end.add_days(-(i64::from(days) - 1)),
                    end,
                    window_days: Some(days),
                }
            }
        }
    }

    /// Workable days in the window, most recent first.
    pub fn days(&self, policy: &ConstraintPolicy) -> Vec<DayKey> {
        match self.mode {
            WindowMode::CycleToDate => {
                let mut days: Vec<DayKey> = self
                    .start
                    .through(self.end)
                    .filter(|d| policy.is_workable(*d))
                    .collect();
                days.reverse();
                days
            }
            WindowMode::Rolling => {
                let want = self.window_days.unwrap_or(policy.scoring_window_days) as usize;
                (0..MAX_LOOKBACK_DAYS)
                    .map(|back| self.end.add_days(-back))
                    .filter(|d| policy.is_workable(*d))
                    .take(want)
                    .collect()
            }
        }
    }

    pub fn label(&self) -> String {
        match self.mode {
            WindowMode::CycleToDate => format!("Active cycle to date ({} to {})", self.start, self.end),
            WindowMode::Rolling => format!("Last {} workable days", self.window_days.unwrap_or(14)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Throughput
// ═══════════════════════════════════════════════════════════════════════

/// Completed work per day within a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub blocks_by_day: BTreeMap<DayKey, u32>,
    pub minutes_by_day: BTreeMap<DayKey, u32>,
    pub blocks_total: u32,
    pub minutes_total: u32,
}

/// Count the goal's completed events on each of `days`. Planning churn is
/// ignored; only completions count.
pub fn completed_throughput(
    events: &[ExecutionEvent],
    goal_id: &str,
    days: &[DayKey],
    policy: &ConstraintPolicy,
) -> Throughput {
    let allowed: BTreeSet<DayKey> = days.iter().copied().collect();
    let mut out = Throughput::default();
    for event in events {
        if !event.is_completion() || event.goal_id.as_deref() != Some(goal_id) {
            continue;
        }
        let Some(day) = event.effective_day(policy.zone) else {
            continue;
        };
        if !allowed.contains(&day) {
            continue;
        }
        *out.blocks_by_day.entry(day).or_default() += 1;
        *out.minutes_by_day.entry(day).or_default() += event.minutes;
        out.blocks_total += 1;
        out.minutes_total += event.minutes;
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════

fn clamp01(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Abramowitz and Stegun 7.1.26.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t) * (-x * x).exp();
    sign * y
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

// ═══════════════════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbabilityStatus {
    Infeasible,
    Unschedulable,
    Eligible,
    Ineligible,
    NoEvidence,
}

impl fmt::Display for ProbabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Infeasible => "INFEASIBLE",
            Self::Unschedulable => "UNSCHEDULABLE",
            Self::Eligible => "ELIGIBLE",
            Self::Ineligible => "INELIGIBLE",
            Self::NoEvidence => "NO_EVIDENCE",
        };
        f.write_str(label)
    }
}

/// The numbers behind the evidence estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub mu: f64,
    pub sigma: f64,
    /// Series length.
    pub k: u32,
    /// Workable days remaining.
    pub d: u32,
    pub remaining_blocks_total: u32,
    pub required_blocks_per_day: Option<u32>,
    pub expected_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub completed_count: u32,
    pub evidence_days: u32,
    pub days_in_window: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityResult {
    pub goal_id: String,
    pub value: f64,
    pub status: ProbabilityStatus,
    pub cap_applied: bool,
    pub reasons: Vec<String>,
    pub prior: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_value: Option<f64>,
    pub window: ProbabilityWindow,
    pub evidence: EvidenceSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringSummary>,
    pub policy_version: String,
}

/// Everything a probability score reads.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityRequest<'a> {
    pub goal_id: &'a str,
    pub feasibility: &'a FeasibilityResult,
    pub plan_proof: Option<&'a PlanProof>,
    pub policy: &'a ConstraintPolicy,
    pub events: &'a [ExecutionEvent],
    pub window: &'a ProbabilityWindow,
    /// Conflicts still open on the cached auto-plan.
    pub conflicts: &'a [ConflictCode],
}

/// Structural prior: penalize intensity, thin slack and dense constraints.
pub fn prior_probability(plan_proof: Option<&PlanProof>, policy: &ConstraintPolicy) -> f64 {
    let Some(proof) = plan_proof else {
        return clamp01(1.0 - (0.35 + 0.2 * policy.density())).min(PRIOR_CAP);
    };
    if !proof.is_feasible() {
        return 0.0;
    }
    let intensity = clamp01(proof.intensity_ratio);
    let slack_penalty = clamp01(1.0 - clamp01(proof.slack_ratio));
    let density = clamp01(policy.density());
    clamp01(1.0 - (0.45 * intensity + 0.35 * slack_penalty + 0.2 * density)).min(PRIOR_CAP)
}

/// Probability that a normal total over `d` days reaches `remaining`.
pub fn evidence_probability(mu: f64, sigma: f64, d: u32, remaining: u32) -> f64 {
    let d = f64::from(d);
    let remaining = f64::from(remaining);
    if sigma == 0.0 {
        return if d * mu >= remaining { 1.0 } else { 0.0 };
    }
    let z = (remaining - d * mu) / (d.sqrt() * sigma);
    clamp01(1.0 - normal_cdf(z))
}

/// Score the goal's chance of success.
pub fn score_probability(req: &ProbabilityRequest<'_>) -> ProbabilityResult {
    let feasibility = req.feasibility;
    let prior = prior_probability(req.plan_proof, req.policy);
    let days = req.window.days(req.policy);
    let throughput = completed_throughput(req.events, req.goal_id, &days, req.policy);
    let evidence_days = u32::try_from(throughput.blocks_by_day.len()).unwrap_or(u32::MAX);
    let evidence = EvidenceSummary {
        completed_count: throughput.blocks_total,
        evidence_days,
        days_in_window: u32::try_from(days.len()).unwrap_or(u32::MAX),
    };

    let mut result = ProbabilityResult {
        goal_id: req.goal_id.to_string(),
        value: 0.0,
        status: ProbabilityStatus::Infeasible,
        cap_applied: false,
        reasons: Vec::new(),
        prior,
        evidence_value: None,
        window: req.window.clone(),
        evidence,
        scoring: None,
        policy_version: POLICY_VERSION.to_string(),
    };

    if feasibility.is_infeasible() {
        result.reasons.push("INFEASIBLE".into());
        return result;
    }
    if feasibility.remaining_blocks_total == 0 {
        result.value = 1.0;
        result.status = ProbabilityStatus::Eligible;
        result.reasons.push("GOAL_HAS_NO_REMAINING_WORK".into());
        return result;
    }
    if feasibility.workable_days_remaining == 0 {
        result.reasons.push("NO_WORKABLE_DAYS".into());
        return result;
    }

    let series: Vec<f64> = days
        .iter()
        .map(|d| f64::from(throughput.blocks_by_day.get(d).copied().unwrap_or(0)))
        .collect();
    let mu = mean(&series);
    let sigma = stddev(&series);
    let d = feasibility.workable_days_remaining;
    let remaining = feasibility.remaining_blocks_total;
    let evidence_value = evidence_probability(mu, sigma, d, remaining);
    result.scoring = Some(ScoringSummary {
        mu,
        sigma,
        k: u32::try_from(series.len()).unwrap_or(u32::MAX),
        d,
        remaining_blocks_total: remaining,
        required_blocks_per_day: feasibility.required_blocks_per_day,
        expected_total: f64::from(d) * mu,
    });

    if evidence_days == 0 {
        result.value = prior;
        result.status = ProbabilityStatus::NoEvidence;
        result.cap_applied = true;
        result.reasons.push("CAP_APPLIED_NO_EVIDENCE".into());
    } else if evidence_days < EVIDENCE_THRESHOLD_DAYS {
        result.evidence_value = Some(evidence_value);
        result.value = ((evidence_value + prior) / 2.0).min(PRIOR_CAP);
        result.status = ProbabilityStatus::Ineligible;
        result.cap_applied = true;
        result.reasons.push("CAP_APPLIED_INSUFFICIENT_EVIDENCE".into());
    } else {
        result.evidence_value = Some(evidence_value);
        result.value = evidence_value;
        result.status = ProbabilityStatus::Eligible;
    }

    if !req.conflicts.is_empty() {
        result.value = clamp01(result.value * UNSCHEDULABLE_PENALTY);
        result.status = ProbabilityStatus::Unschedulable;
        result
            .reasons
            .extend(req.conflicts.iter().map(|c| format!("UNSCHEDULABLE_{c}")));
    }
    result
}
