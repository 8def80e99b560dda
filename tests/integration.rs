//! End-to-end tests for the planning kernel.
//!
//! Every test drives `compute`/`replay` through the public action set and
//! inspects the returned snapshot, the same way a host application would.

use jericho::config::KernelConfig;
use jericho::constraints::{ConstraintPolicy, TimeWindow};
use jericho::convergence::ConvergenceVerdict;
use jericho::cycle::SuggestionStatus;
use jericho::kernel::action::{
    BlockRef, CompileGoalEquation, CreateBlock, CreateDeliverable, LinkBlock, StartCycle, SuggestionRef, Tick,
};
use jericho::kernel::{Action, DenialCode, Snapshot, compute, replay};
use jericho::ledger::{BlockStatus, EventKind, LinkageStatus, Origin, Placement};
use jericho::plan_proof::{GoalEquation, GoalFamily, MechanismClass, Objective};
use jericho::probability::{ProbabilityStatus, WindowMode};
use jericho::time::DayKey;

fn dk(s: &str) -> DayKey {
    DayKey::parse(s).unwrap()
}

fn config() -> KernelConfig {
    let mut policy = ConstraintPolicy::in_zone(chrono_tz::UTC);
    policy.working_hours = vec![TimeWindow::new(9 * 60, 17 * 60)];
    KernelConfig::with_constraints(policy)
}

fn practice(hours: f64, deadline: &str) -> GoalEquation {
    GoalEquation {
        family: Some(GoalFamily::Skill),
        mechanism_class: Some(MechanismClass::Throughput),
        objective: Some(Objective::PracticeHoursTotal),
        objective_value: Some(hours),
        deadline: Some(dk(deadline)),
        work_days_per_week: Some(7),
        max_daily_work_minutes: Some(120),
        weekends_allowed: Some(true),
        ..Default::default()
    }
}

fn start(now: &str, equation: Option<GoalEquation>) -> Action {
    Action::StartCycle(StartCycle {
        now: now.into(),
        cycle_id: "c1".into(),
        goal_id: Some("g1".into()),
        equation,
    })
}

fn create(now: &str, block_id: &str, start: &str, deliverable: Option<&str>) -> Action {
    Action::CreateBlock(CreateBlock {
        now: now.into(),
        block_id: block_id.into(),
        start: start.into(),
        minutes: 60,
        label: None,
        domain: Default::default(),
        placement: None,
        deliverable_id: deliverable.map(String::from),
        criterion_id: None,
    })
}

fn complete(now: &str, block_id: &str) -> Action {
    Action::CompleteBlock(BlockRef {
        now: now.into(),
        block_id: block_id.into(),
    })
}

fn delete(now: &str, block_id: &str) -> Action {
    Action::DeleteBlock(BlockRef {
        now: now.into(),
        block_id: block_id.into(),
    })
}

fn tick(now: &str) -> Action {
    Action::TickNow(Tick { now: now.into() })
}

fn deliverable(now: &str, id: &str, required: u32) -> Action {
    Action::CreateDeliverable(CreateDeliverable {
        now: now.into(),
        deliverable_id: id.into(),
        title: "Chapter 1".into(),
        required_blocks: required,
        must_finish_by: None,
    })
}

fn end(now: &str) -> Action {
    Action::EndCycle(Tick { now: now.into() })
}

fn run(actions: &[Action]) -> Snapshot {
    replay(&Snapshot::default(), actions, &config())
}

fn events_of(snapshot: &Snapshot, kind: EventKind) -> usize {
    snapshot.cycles["c1"]
        .ledger
        .events()
        .iter()
        .filter(|e| e.kind == kind)
        .count()
}

// ── Idempotence ──

#[test]
fn compute_is_deterministic() {
    let config = config();
    let base = run(&[start("2026-03-10T08:00:00Z", None)]);
    let action = create("2026-03-10T08:05:00Z", "b1", "2026-03-10T09:00:00Z", None);

    let first = compute(&base, &action, &config);
    let second = compute(&base, &action, &config);
    assert_eq!(first, second);
    assert_eq!(first.cycles["c1"].ledger.len(), 1);
    assert!(base.cycles["c1"].ledger.is_empty(), "input snapshot must not change");
}

#[test]
fn repeated_create_is_refused_without_duplication() {
    let config = config();
    let action = create("2026-03-10T08:05:00Z", "b1", "2026-03-10T09:00:00Z", None);
    let once = compute(&run(&[start("2026-03-10T08:00:00Z", None)]), &action, &config);
    let twice = compute(&once, &action, &config);

    assert!(twice.is_denied(DenialCode::EventRefused));
    assert_eq!(twice.cycles["c1"].ledger.len(), 1);
}

#[test]
fn proposal_is_deterministic() {
    let config = config();
    let base = run(&[start("2026-03-10T06:00:00Z", Some(practice(10.0, "2026-03-19")))]);
    let propose = Action::ProposeSchedule(Tick {
        now: "2026-03-10T06:01:00Z".into(),
    });
    let first = compute(&base, &propose, &config);
    let second = compute(&base, &propose, &config);
    assert_eq!(first.cycles, second.cycles);
    assert_eq!(first.denials, second.denials);
}

#[test]
fn rollover_twice_on_same_day_emits_once() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        tick("2026-03-10T08:00:00Z"),
        create("2026-03-10T08:05:00Z", "b1", "2026-03-10T09:00:00Z", None),
        tick("2026-03-11T00:05:00Z"),
        tick("2026-03-11T07:00:00Z"),
    ]);
    assert_eq!(events_of(&s, EventKind::Missed), 1);
    assert_eq!(s.cycles["c1"].ledger.len(), 3);
}

// ── Rollover ──

#[test]
fn rollover_carries_unfinished_committed_blocks() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        tick("2026-03-10T08:00:00Z"),
        create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", None),
        create("2026-03-10T08:02:00Z", "b2", "2026-03-10T11:00:00Z", None),
        create("2026-03-10T08:03:00Z", "b3", "2026-03-10T14:00:00Z", None),
        complete("2026-03-10T15:00:00Z", "b3"),
        tick("2026-03-11T00:01:00Z"),
    ]);

    assert_eq!(events_of(&s, EventKind::Missed), 2);
    let today = dk("2026-03-11");
    let carried = s.materialized.day(today);
    assert_eq!(carried.len(), 2);
    for block in carried {
        assert!(block.id.starts_with("overdue-"), "unexpected id {}", block.id);
        assert_eq!(DayKey::from_instant(block.start, chrono_tz::UTC), today);
    }
    assert!(s.materialized.block("overdue-b3-2026-03-11").is_none());
    assert_eq!(s.last_rollover_day, Some(today));
}

#[test]
fn tentative_blocks_stay_behind() {
    let mut pencil = create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", None);
    if let Action::CreateBlock(c) = &mut pencil {
        c.placement = Some(Placement::Tentative);
    }
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        tick("2026-03-10T08:00:00Z"),
        pencil,
        tick("2026-03-11T00:01:00Z"),
    ]);
    assert_eq!(events_of(&s, EventKind::Missed), 0);
    assert!(s.materialized.day(dk("2026-03-11")).is_empty());
}

// ── Tombstones ──

#[test]
fn deleted_block_never_comes_back() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", None),
        delete("2026-03-10T08:02:00Z", "b1"),
    ]);
    assert!(s.materialized.block("b1").is_none());

    let again = compute(
        &s,
        &create("2026-03-10T08:03:00Z", "b1", "2026-03-10T10:00:00Z", None),
        &config(),
    );
    assert!(again.is_denied(DenialCode::EventRefused));
    assert!(again.materialized.block("b1").is_none());

    let late = compute(&s, &complete("2026-03-10T10:00:00Z", "b1"), &config());
    assert!(late.is_denied(DenialCode::EventRefused));
}

// ── Linkage ──

#[test]
fn unlinked_completion_never_counts_toward_convergence() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        deliverable("2026-03-10T08:00:00Z", "d1", 1),
        create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", None),
        complete("2026-03-10T10:00:00Z", "b1"),
        end("2026-03-10T18:00:00Z"),
    ]);
    let report = s.cycles["c1"].convergence.as_ref().unwrap();
    assert_eq!(report.verdict, ConvergenceVerdict::Incomplete);
    assert_eq!(report.e_end.completed_units, 0);
    assert_eq!(report.e_end.unlinked_activity_blocks, 1);
}

#[test]
fn linking_after_creation_counts() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        deliverable("2026-03-10T08:00:00Z", "d1", 1),
        create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", None),
        Action::LinkBlockToDeliverable(LinkBlock {
            now: "2026-03-10T08:02:00Z".into(),
            block_id: "b1".into(),
            deliverable_id: Some("d1".into()),
            criterion_id: None,
        }),
        complete("2026-03-10T10:00:00Z", "b1"),
    ]);
    let block = s.materialized.block("b1").unwrap();
    assert_eq!(block.linkage(), LinkageStatus::Linked);
    assert_eq!(block.status, BlockStatus::Completed);
}

// ── Convergence and learning ──

#[test]
fn one_of_two_is_incomplete() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        deliverable("2026-03-10T08:00:00Z", "d1", 2),
        create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", Some("d1")),
        complete("2026-03-10T10:00:00Z", "b1"),
        end("2026-03-10T18:00:00Z"),
    ]);
    let report = s.cycles["c1"].convergence.as_ref().unwrap();
    assert_eq!(report.verdict, ConvergenceVerdict::Incomplete);
    assert!(report.reasons[0].contains("deficit"), "{}", report.reasons[0]);
    assert_eq!(s.learning.cycle_count, 0);
    assert!(s.active_cycle_id.is_none());
}

#[test]
fn two_of_two_converges_and_feeds_learning() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        deliverable("2026-03-10T08:00:00Z", "d1", 2),
        create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", Some("d1")),
        create("2026-03-10T08:02:00Z", "b2", "2026-03-10T11:00:00Z", Some("d1")),
        complete("2026-03-10T10:00:00Z", "b1"),
        complete("2026-03-10T12:00:00Z", "b2"),
        end("2026-03-10T18:00:00Z"),
    ]);
    let report = s.cycles["c1"].convergence.as_ref().unwrap();
    assert_eq!(report.verdict, ConvergenceVerdict::Converged);
    assert!(report.reasons.is_empty());
    assert_eq!(s.learning.cycle_count, 1);
    assert_eq!(s.learning.total_completion_count, 2);
}

#[test]
fn ended_cycle_refuses_further_work() {
    let s = run(&[start("2026-03-10T08:00:00Z", None), end("2026-03-10T18:00:00Z")]);
    let restart = compute(&s, &start("2026-03-11T08:00:00Z", None), &config());
    assert!(restart.is_denied(DenialCode::CycleAlreadyEnded));

    let work = compute(
        &s,
        &create("2026-03-11T08:00:00Z", "b1", "2026-03-11T09:00:00Z", None),
        &config(),
    );
    assert!(work.is_denied(DenialCode::NoActiveCycle));
}

// ── Admission gating ──

#[test]
fn proposing_without_admitted_goal_is_denied() {
    let s = run(&[start("2026-03-10T08:00:00Z", None)]);
    let next = compute(
        &s,
        &Action::ProposeSchedule(Tick {
            now: "2026-03-10T08:01:00Z".into(),
        }),
        &config(),
    );
    assert_eq!(next.denial_codes(), vec![DenialCode::GoalNotAdmitted]);
    assert!(next.cycles["c1"].suggestions.is_empty());
}

#[test]
fn past_deadline_goal_is_not_admitted() {
    let s = run(&[
        start("2026-03-10T08:00:00Z", None),
        Action::CompileGoalEquation(CompileGoalEquation {
            now: "2026-03-10T08:01:00Z".into(),
            goal_id: "g1".into(),
            equation: practice(10.0, "2026-03-10"),
        }),
    ]);
    assert!(s.is_denied(DenialCode::GoalNotAdmitted));
    assert!(s.is_denied(DenialCode::DeadlinePassed));
    assert!(s.reports.is_empty());
    let cycle = &s.cycles["c1"];
    assert!(cycle.goal.is_none(), "a rejected goal is not attached");
    assert!(!cycle.admission.as_ref().unwrap().is_admitted());
}

#[test]
fn propose_and_accept_suggestions() {
    let config = config();
    let s = run(&[
        start("2026-03-10T06:00:00Z", Some(practice(10.0, "2026-03-19"))),
        Action::ProposeSchedule(Tick {
            now: "2026-03-10T06:01:00Z".into(),
        }),
    ]);
    let cycle = &s.cycles["c1"];
    assert!(cycle.admission.as_ref().unwrap().is_admitted());
    assert!(!cycle.suggestions.is_empty());
    assert!(s.reports.contains_key("g1"));

    let first = cycle.suggestions[0].id.clone();
    let accept = Action::AcceptSuggestedBlock(SuggestionRef {
        now: "2026-03-10T06:02:00Z".into(),
        suggestion_id: first.clone(),
    });
    let once = compute(&s, &accept, &config);
    let twice = compute(&once, &accept, &config);
    assert_eq!(once.cycles["c1"].ledger.len(), 1);
    assert_eq!(twice.cycles["c1"].ledger.len(), 1);

    let created = &twice.cycles["c1"].ledger.events()[0];
    assert_eq!(created.origin, Origin::Suggestion);
    assert_eq!(created.suggestion_id.as_deref(), Some(first.as_str()));
    let accepted = twice.cycles["c1"].suggestions.iter().find(|x| x.id == first).unwrap();
    assert_eq!(accepted.status, SuggestionStatus::Accepted);

    let all = Action::AcceptAllSuggestedBlocks(Tick {
        now: "2026-03-10T06:03:00Z".into(),
    });
    let done = compute(&twice, &all, &config);
    assert_eq!(done.cycles["c1"].ledger.len(), cycle.suggestions.len());
    assert!(done.cycles["c1"].suggestions.iter().all(|x| !x.is_pending()));

    let empty = compute(&done, &all, &config);
    assert_eq!(empty.denial_codes(), vec![DenialCode::NoProposedBlocks]);
}

#[test]
fn unknown_suggestion_is_denied() {
    let s = run(&[start("2026-03-10T06:00:00Z", Some(practice(10.0, "2026-03-19")))]);
    let next = compute(
        &s,
        &Action::RejectSuggestedBlock(SuggestionRef {
            now: "2026-03-10T06:01:00Z".into(),
            suggestion_id: "sug-nope".into(),
        }),
        &config(),
    );
    assert!(next.is_denied(DenialCode::SuggestionNotFound));
}

// ── Probability ──

fn worked_days(days: &[&str], per_day: u32, hours: f64, deadline: &str) -> Vec<Action> {
    let mut actions = vec![start(&format!("{}T06:00:00Z", days[0]), Some(practice(hours, deadline)))];
    for day in days {
        for i in 0..per_day {
            let id = format!("b-{day}-{i}");
            let begin = format!("{day}T{:02}:00:00Z", 9 + 3 * i);
            actions.push(create(&format!("{day}T{:02}:00:00Z", 8 + 3 * i), &id, &begin, None));
            actions.push(complete(&format!("{day}T{:02}:30:00Z", 10 + 3 * i), &id));
        }
    }
    actions
}

#[test]
fn thin_evidence_is_capped() {
    let s = run(&worked_days(&["2026-03-10", "2026-03-11", "2026-03-12"], 1, 10.0, "2026-03-31"));
    let probability = &s.reports["g1"].probability;
    assert_eq!(probability.evidence.evidence_days, 3);
    assert!(matches!(
        probability.status,
        ProbabilityStatus::Ineligible | ProbabilityStatus::NoEvidence
    ));
    assert!(probability.value <= 0.65);
    assert!(probability.cap_applied);
}

#[test]
fn strong_evidence_is_eligible() {
    let days = [
        "2026-03-10",
        "2026-03-11",
        "2026-03-12",
        "2026-03-13",
        "2026-03-14",
        "2026-03-15",
        "2026-03-16",
        "2026-03-17",
    ];
    let s = run(&worked_days(&days, 2, 20.0, "2026-03-31"));
    let report = &s.reports["g1"];
    assert_eq!(report.feasibility.remaining_blocks_total, 4);
    assert_eq!(report.probability.status, ProbabilityStatus::Eligible);
    assert!(report.probability.value >= 0.8, "{}", report.probability.value);
    assert!(!report.probability.cap_applied);
}

#[test]
fn report_pace_tracks_the_current_day() {
    let s = run(&[start("2026-03-10T06:00:00Z", Some(practice(10.0, "2026-03-19")))]);
    let proof = &s.reports["g1"].plan_proof;
    assert_eq!(proof.workable_days_remaining, 10);
    assert_eq!(proof.required_pace_per_day, 1.0);

    let later = compute(&s, &tick("2026-03-16T12:00:00Z"), &config());
    let proof = &later.reports["g1"].plan_proof;
    assert_eq!(proof.workable_days_remaining, 4);
    assert_eq!(proof.required_pace_per_day, 2.5);
    assert!(!proof.is_feasible(), "2.5 a day exceeds the 2-session daily ceiling");
}

#[test]
fn rolling_window_mode_reaches_reports() {
    let mut config = config();
    config.constraints.window_mode = WindowMode::Rolling;
    config.constraints.scoring_window_days = 5;
    let actions = worked_days(&["2026-03-10", "2026-03-11", "2026-03-12"], 1, 10.0, "2026-03-31");
    let s = replay(&Snapshot::default(), &actions, &config);

    let window = &s.reports["g1"].probability.window;
    assert_eq!(window.mode, WindowMode::Rolling);
    assert_eq!(window.label(), "Last 5 workable days");
    assert_eq!(window.start, dk("2026-03-08"));

    let default = run(&actions);
    assert_eq!(default.reports["g1"].probability.window.mode, WindowMode::CycleToDate);
}

// ── Timestamps ──

#[test]
fn bare_dates_are_refused_as_invalid_timestamps() {
    let s = run(&[start("2026-03-10T08:00:00Z", None)]);
    let bad_now = compute(
        &s,
        &create("2026-03-10", "b1", "2026-03-10T09:00:00Z", None),
        &config(),
    );
    assert_eq!(bad_now.denial_codes(), vec![DenialCode::InvalidTimestamp]);
    assert_eq!(bad_now.cycles, s.cycles);

    let bad_start = compute(&s, &create("2026-03-10T08:00:00Z", "b1", "9:30", None), &config());
    assert_eq!(bad_start.denial_codes(), vec![DenialCode::InvalidTimestamp]);
    assert!(bad_start.cycles["c1"].ledger.is_empty());
}

// ── Persistence ──

#[test]
fn snapshot_and_config_survive_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("jericho.toml");
    let snapshot_path = dir.path().join("state.json");

    config().save(&config_path).unwrap();
    let config = KernelConfig::load(&config_path).unwrap();

    let s = replay(
        &Snapshot::default(),
        &[
            start("2026-03-10T08:00:00Z", Some(practice(10.0, "2026-03-19"))),
            create("2026-03-10T08:01:00Z", "b1", "2026-03-10T09:00:00Z", None),
        ],
        &config,
    );
    jericho::persist::save_snapshot(&snapshot_path, &s).unwrap();
    let back = jericho::persist::load_snapshot(&snapshot_path).unwrap();
    assert_eq!(back.cycles, s.cycles);
    assert_eq!(back.active_cycle_id, s.active_cycle_id);
}
