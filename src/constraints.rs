//! Constraint policy: the calendar and capacity rules every engine reads.
//!
//! The policy arrives with each kernel call; nothing here is cached between
//! calls. Day-level rules (blackouts, weekdays, overrides) are keyed by
//! [`DayKey`]; intra-day rules are minute-of-day windows.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::probability::WindowMode;
use crate::time::{DEFAULT_ZONE, DayKey};

/// Minutes in one day; the exclusive upper bound of any window.
pub const MINUTES_PER_DAY: u32 = 1440;

/// A half-open `[start, end)` range of minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_min: u32,
    pub end_min: u32,
}

impl TimeWindow {
    pub fn new(start_min: u32, end_min: u32) -> Self {
        Self { start_min, end_min }
    }

    pub fn whole_day() -> Self {
        Self::new(0, MINUTES_PER_DAY)
    }

    pub fn len(&self) -> u32 {
        self.end_min.saturating_sub(self.start_min)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_min < other.end_min && other.start_min < self.end_min
    }

    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start_min <= other.start_min && other.end_min <= self.end_min
    }
}

/// Clamp to one day, drop empty windows, sort and merge touching ones.
pub fn normalize_windows(windows: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut cleaned: Vec<TimeWindow> = windows
        .iter()
        .map(|w| {
            TimeWindow::new(
                w.start_min.min(MINUTES_PER_DAY),
                w.end_min.min(MINUTES_PER_DAY),
            )
        })
        .filter(|w| !w.is_empty())
        .collect();
    cleaned.sort();

    let mut merged: Vec<TimeWindow> = Vec::with_capacity(cleaned.len());
    for w in cleaned {
        match merged.last_mut() {
            Some(last) if w.start_min <= last.end_min => last.end_min = last.end_min.max(w.end_min),
            _ => merged.push(w),
        }
    }
    merged
}

/// Remove every forbidden range from the allowed windows.
pub fn subtract_windows(allowed: &[TimeWindow], forbidden: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut segments: Vec<TimeWindow> = allowed.to_vec();
    for block in forbidden {
        segments = segments
            .into_iter()
            .flat_map(|seg| {
                if !seg.overlaps(block) {
                    return vec![seg];
                }
                let mut parts = Vec::with_capacity(2);
                if block.start_min > seg.start_min {
                    parts.push(TimeWindow::new(seg.start_min, block.start_min));
                }
                if block.end_min < seg.end_min {
                    parts.push(TimeWindow::new(block.end_min, seg.end_min));
                }
                parts
            })
            .collect();
    }
    segments
}

/// Calendar and capacity rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintPolicy {
    /// IANA zone every local-day computation uses.
    #[serde(default = "default_zone")]
    pub zone: Tz,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks_per_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_session_minutes: Option<u32>,
    /// Allowed intra-day windows. Empty means the whole day.
    #[serde(default)]
    pub working_hours: Vec<TimeWindow>,
    #[serde(default)]
    pub forbidden_windows: Vec<TimeWindow>,
    /// Days the scheduler must not place sessions on.
    #[serde(default)]
    pub forbidden_day_keys: BTreeSet<DayKey>,
    /// Days with no capacity at all.
    #[serde(default)]
    pub blackout_dates: BTreeSet<DayKey>,
    /// Weekdays that carry capacity. Empty means every weekday.
    #[serde(default)]
    pub workable_weekdays: Vec<Weekday>,
    /// Per-day capacity replacing the daily cap.
    #[serde(default)]
    pub daily_capacity_overrides: BTreeMap<DayKey, u32>,
    /// Blocks already committed elsewhere, subtracted from capacity.
    #[serde(default)]
    pub committed_blocks_by_date: BTreeMap<DayKey, u32>,
    /// Rolling probability window length in workable days.
    #[serde(default = "default_scoring_window_days")]
    pub scoring_window_days: u32,
    /// Evidence window for probability scoring.
    #[serde(default)]
    pub window_mode: WindowMode,
}

fn default_zone() -> Tz {
    DEFAULT_ZONE
}

fn default_scoring_window_days() -> u32 {
    14
}

impl Default for ConstraintPolicy {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            max_blocks_per_day: None,
            max_blocks_per_week: None,
            min_session_minutes: None,
            working_hours: Vec::new(),
            forbidden_windows: Vec::new(),
            forbidden_day_keys: BTreeSet::new(),
            blackout_dates: BTreeSet::new(),
            workable_weekdays: Vec::new(),
            daily_capacity_overrides: BTreeMap::new(),
            committed_blocks_by_date: BTreeMap::new(),
            scoring_window_days: default_scoring_window_days(),
            window_mode: WindowMode::default(),
        }
    }
}

impl ConstraintPolicy {
    /// A policy in `zone` with every other field defaulted.
    pub fn in_zone(zone: Tz) -> Self {
        Self {
            zone,
            ..Default::default()
        }
    }

    /// Whether `day` carries capacity: not blacked out and on an allowed weekday.
    pub fn is_workable(&self, day: DayKey) -> bool {
        if self.blackout_dates.contains(&day) {
            return false;
        }
        self.workable_weekdays.is_empty() || self.workable_weekdays.contains(&day.weekday())
    }

    /// Whether the scheduler may place sessions on `day`.
    pub fn is_schedulable(&self, day: DayKey) -> bool {
        self.is_workable(day) && !self.forbidden_day_keys.contains(&day)
    }

    /// Net block capacity on `day`: override or daily cap, minus committed load.
    ///
    /// `fallback_cap` applies when the policy has no daily cap.
    pub fn net_capacity(&self, day: DayKey, fallback_cap: u32) -> u32 {
        if !self.is_workable(day) {
            return 0;
        }
        let base = self
            .daily_capacity_overrides
            .get(&day)
            .copied()
            .or(self.max_blocks_per_day)
            .unwrap_or(fallback_cap);
        let committed = self.committed_blocks_by_date.get(&day).copied().unwrap_or(0);
        base.saturating_sub(committed)
    }

    /// Allowed intra-day windows after removing forbidden ones.
    pub fn allowed_windows(&self) -> Vec<TimeWindow> {
        let base = if self.working_hours.is_empty() {
            vec![TimeWindow::whole_day()]
        } else {
            self.working_hours.clone()
        };
        subtract_windows(
            &normalize_windows(&base),
            &normalize_windows(&self.forbidden_windows),
        )
    }

    /// Number of workable weekdays in a week.
    pub fn workable_weekday_count(&self) -> u32 {
        if self.workable_weekdays.is_empty() {
            return 7;
        }
        let unique: BTreeSet<u32> = self
            .workable_weekdays
            .iter()
            .map(|d| d.num_days_from_monday())
            .collect();
        unique.len() as u32
    }

    /// Fraction of the five capacity-shaping constraints that are set.
    pub fn density(&self) -> f64 {
        let present = [
            self.max_blocks_per_day.is_some_and(|v| v > 0),
            self.max_blocks_per_week.is_some_and(|v| v > 0),
            !self.blackout_dates.is_empty(),
            !self.workable_weekdays.is_empty(),
            !self.daily_capacity_overrides.is_empty(),
        ];
        present.iter().filter(|p| **p).count() as f64 / present.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dk(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    // ── Windows ──

    #[test]
    fn normalize_merges_and_clamps() {
        let merged = normalize_windows(&[
            TimeWindow::new(600, 720),
            TimeWindow::new(540, 600),
            TimeWindow::new(1400, 2000),
            TimeWindow::new(800, 800),
        ]);
        assert_eq!(merged, [TimeWindow::new(540, 720), TimeWindow::new(1400, 1440)]);
    }

    #[test]
    fn subtract_splits_windows() {
        let allowed = [TimeWindow::new(540, 1020)];
        let forbidden = [TimeWindow::new(720, 780)];
        assert_eq!(
            subtract_windows(&allowed, &forbidden),
            [TimeWindow::new(540, 720), TimeWindow::new(780, 1020)]
        );
        let all = [TimeWindow::new(0, 1440)];
        assert!(subtract_windows(&allowed, &all).is_empty());
    }

    // ── Capacity ──

    #[test]
    fn net_capacity_prefers_override_and_subtracts_committed() {
        let mut policy = ConstraintPolicy::in_zone(chrono_tz::UTC);
        policy.max_blocks_per_day = Some(3);
        policy.daily_capacity_overrides.insert(dk("2026-03-10"), 5);
        policy.committed_blocks_by_date.insert(dk("2026-03-10"), 2);
        policy.committed_blocks_by_date.insert(dk("2026-03-11"), 9);
        assert_eq!(policy.net_capacity(dk("2026-03-10"), 0), 3);
        assert_eq!(policy.net_capacity(dk("2026-03-11"), 0), 0);
        assert_eq!(policy.net_capacity(dk("2026-03-12"), 0), 3);
    }

    #[test]
    fn non_workable_days_have_no_capacity() {
        let mut policy = ConstraintPolicy::in_zone(chrono_tz::UTC);
        policy.workable_weekdays = vec![Weekday::Mon, Weekday::Wed];
        policy.blackout_dates.insert(dk("2026-03-11"));
        // 2026-03-09 is a Monday.
        assert_eq!(policy.net_capacity(dk("2026-03-09"), 2), 2);
        assert_eq!(policy.net_capacity(dk("2026-03-10"), 2), 0);
        assert_eq!(policy.net_capacity(dk("2026-03-11"), 2), 0);
        assert_eq!(policy.workable_weekday_count(), 2);
    }

    #[test]
    fn forbidden_day_keys_block_scheduling_only() {
        let mut policy = ConstraintPolicy::in_zone(chrono_tz::UTC);
        policy.forbidden_day_keys.insert(dk("2026-03-10"));
        assert!(policy.is_workable(dk("2026-03-10")));
        assert!(!policy.is_schedulable(dk("2026-03-10")));
    }

    #[test]
    fn density_counts_present_constraints() {
        let mut policy = ConstraintPolicy::default();
        assert_eq!(policy.density(), 0.0);
        policy.max_blocks_per_day = Some(2);
        policy.blackout_dates.insert(dk("2026-03-10"));
        assert!((policy.density() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn policy_toml_round_trip() {
        let mut policy = ConstraintPolicy::in_zone(chrono_tz::Europe::Berlin);
        policy.max_blocks_per_day = Some(2);
        policy.working_hours = vec![TimeWindow::new(540, 1020)];
        policy.workable_weekdays = vec![Weekday::Mon, Weekday::Fri];
        policy.blackout_dates.insert(dk("2026-12-25"));
        policy.daily_capacity_overrides.insert(dk("2026-12-24"), 1);
        let text = toml::to_string_pretty(&policy).unwrap();
        let back: ConstraintPolicy = toml::from_str(&text).unwrap();
        assert_eq!(back, policy);
    }
}
