//! Benchmarks for scheduling and ledger replay.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use jericho::constraints::{ConstraintPolicy, TimeWindow};
use jericho::ledger::{EventKind, ExecutionEvent, materialize};
use jericho::plan_proof::{GoalEquation, GoalFamily, MechanismClass, Objective, derive_plan_proof};
use jericho::scheduler::{BusyInterval, ScheduleRequest, compile_auto_plan};
use jericho::time::{DayKey, parse_instant};

fn policy() -> ConstraintPolicy {
    let mut policy = ConstraintPolicy::in_zone(chrono_tz::UTC);
    policy.working_hours = vec![TimeWindow::new(9 * 60, 17 * 60)];
    policy.forbidden_windows = vec![TimeWindow::new(12 * 60, 13 * 60)];
    policy
}

fn bench_compile_auto_plan(c: &mut Criterion) {
    let equation = GoalEquation {
        family: Some(GoalFamily::Skill),
        mechanism_class: Some(MechanismClass::Throughput),
        objective: Some(Objective::PracticeHoursTotal),
        objective_value: Some(60.0),
        deadline: Some(DayKey::parse("2026-04-30").unwrap()),
        work_days_per_week: Some(7),
        max_daily_work_minutes: Some(240),
        weekends_allowed: Some(true),
        ..Default::default()
    };
    let now = parse_instant("2026-03-10T06:00:00Z").unwrap();
    let proof = derive_plan_proof(&equation, DayKey::parse("2026-03-10").unwrap());
    let policy = policy();
    let busy: Vec<BusyInterval> = (0..28)
        .map(|i| BusyInterval {
            start: now + chrono::Duration::hours(3 + 12 * i),
            minutes: 90,
        })
        .collect();

    c.bench_function("compile_auto_plan_14d", |bench| {
        bench.iter(|| {
            black_box(compile_auto_plan(&ScheduleRequest {
                goal_id: "g1",
                cycle_id: "c1",
                plan_proof: &proof,
                policy: &policy,
                now,
                horizon_days: 14,
                accepted: &busy,
            }))
        })
    });
}

fn bench_materialize(c: &mut Criterion) {
    let start = parse_instant("2026-03-01T09:00:00Z").unwrap();
    let mut events = Vec::new();
    for i in 0..1_000i64 {
        let block = format!("b{i}");
        let at = start + chrono::Duration::hours(i);
        events.push(ExecutionEvent::new(format!("c{i}"), block.clone(), EventKind::Create).with_window(at, 60, chrono_tz::UTC));
        if i % 3 == 0 {
            events.push(ExecutionEvent::new(format!("x{i}"), block, EventKind::Complete));
        }
    }
    let today = DayKey::parse("2026-03-20").unwrap();

    c.bench_function("materialize_1k_blocks", |bench| {
        bench.iter(|| black_box(materialize(&events, today, chrono_tz::UTC)))
    });
}

criterion_group!(benches, bench_compile_auto_plan, bench_materialize);
criterion_main!(benches);
