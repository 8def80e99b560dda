//! One handler per action variant.
//!
//! A handler returns `Err(Denial)` to refuse its action outright; the kernel
//! then hands back the prior snapshot. Denials pushed onto `state.denials`
//! accompany an action that was still applied.

use chrono::{DateTime, Utc};

use super::action::{
    Action, BlockRef, CompileGoalEquation, CreateBlock, CreateCriterion, CreateDeliverable, DeleteDeliverable,
    LinkBlock, RescheduleBlock, SetActiveCycle, StartCycle, SuggestionRef, Tick, ToggleCriterionDone, UpdateBlock,
};
use super::{Call, Denial, DenialCode, Snapshot};
use crate::admission::{AdmissionContext, AdmissionReason, admit_goal, is_admitted};
use crate::convergence::{ConvergenceInput, compute_terminal_convergence};
use crate::cycle::{Cycle, CycleStatus, GoalDefinition, SuggestedBlock, SuggestionStatus, Workspace};
use crate::deliverable::{Criterion, Deliverable};
use crate::learning::summarize_cycle;
use crate::ledger::{BlockStatus, EventKind, ExecutionEvent, Origin};
use crate::plan_proof::{GoalEquation, derive_plan_proof};
use crate::rollover::rollover_at_midnight;
use crate::scheduler::{ScheduleRequest, compile_auto_plan};
use crate::time::parse_instant;

type Outcome = Result<(), Denial>;

/// Route `action` to its handler.
pub(super) fn dispatch(state: &mut Snapshot, action: &Action, call: &Call<'_>) -> Outcome {
    match action {
        Action::StartCycle(a) => start_cycle(state, call, a),
        Action::SetActiveCycle(a) => set_active_cycle(state, a),
        Action::CompileGoalEquation(a) => compile_goal_equation(state, call, a),
        Action::CreateDeliverable(a) => create_deliverable(state, a),
        Action::DeleteDeliverable(a) => delete_deliverable(state, a),
        Action::CreateCriterion(a) => create_criterion(state, a),
        Action::ToggleCriterionDone(a) => toggle_criterion_done(state, a),
        Action::CreateBlock(a) => create_block(state, call, a),
        Action::UpdateBlock(a) => update_block(state, a),
        Action::RescheduleBlock(a) => reschedule_block(state, call, a),
        Action::CompleteBlock(a) => complete_block(state, call, a),
        Action::DeleteBlock(a) => delete_block(state, a),
        Action::LinkBlockToDeliverable(a) => link_block(state, a),
        Action::ProposeSchedule(a) => propose_schedule(state, call, a),
        Action::AcceptSuggestedBlock(a) => accept_suggested_block(state, call, a),
        Action::AcceptAllSuggestedBlocks(a) => accept_all_suggested_blocks(state, call, a),
        Action::RejectSuggestedBlock(a) => reject_suggested_block(state, a),
        Action::TickNow(a) => tick_now(state, call, a),
        Action::EndCycle(a) => end_cycle(state, call, a),
        Action::NoOp => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

fn instant(raw: &str) -> Result<DateTime<Utc>, Denial> {
    parse_instant(raw).map_err(|err| {
        tracing::warn!(error = %err, "refusing action with invalid timestamp");
        Denial::new(DenialCode::InvalidTimestamp, err.to_string())
    })
}

fn active_cycle(state: &Snapshot) -> Result<&Cycle, Denial> {
    let cycle = state
        .active_cycle()
        .ok_or_else(|| Denial::new(DenialCode::NoActiveCycle, "no active cycle"))?;
    if !cycle.is_active() {
        return Err(Denial::new(
            DenialCode::CycleAlreadyEnded,
            format!("cycle {} has ended", cycle.id),
        ));
    }
    Ok(cycle)
}

/// Run `f` on the active cycle's workspace and persist the result.
fn with_workspace<T>(
    state: &mut Snapshot,
    f: impl FnOnce(&mut Workspace) -> Result<T, Denial>,
) -> Result<T, Denial> {
    let cycle = active_cycle(state)?;
    let mut ws = Workspace::hydrate(cycle);
    let out = f(&mut ws)?;
    let persisted = ws.persist(cycle.clone());
    state.cycles.insert(persisted.id.clone(), persisted);
    Ok(out)
}

/// A new event on `block_id` scoped to the workspace's cycle and goal.
fn scoped_event(ws: &Workspace, kind: EventKind, block_id: &str) -> ExecutionEvent {
    ExecutionEvent::new(ws.ledger.next_event_id(kind, block_id), block_id, kind)
        .with_scope(ws.goal_id().map(String::from), Some(ws.cycle_id.clone()))
}

fn append(ws: &mut Workspace, event: ExecutionEvent) -> Outcome {
    let detail = format!("{} on block {} refused by the execution contract", event.kind, event.block_id);
    if ws.ledger.append(event) {
        Ok(())
    } else {
        Err(Denial::new(DenialCode::EventRefused, detail))
    }
}

fn require_admitted(ws: &Workspace) -> Outcome {
    if is_admitted(ws.admission.as_ref()) {
        Ok(())
    } else {
        Err(Denial::new(
            DenialCode::GoalNotAdmitted,
            "the active cycle has no admitted goal",
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Cycles and goals
// ═══════════════════════════════════════════════════════════════════════

fn start_cycle(state: &mut Snapshot, call: &Call<'_>, a: &StartCycle) -> Outcome {
    if let Some(existing) = state.cycles.get(&a.cycle_id) {
        if !existing.is_active() {
            return Err(Denial::new(
                DenialCode::CycleAlreadyEnded,
                format!("cycle {} has ended", a.cycle_id),
            ));
        }
        state.active_cycle_id = Some(a.cycle_id.clone());
        return Ok(());
    }

    state
        .cycles
        .insert(a.cycle_id.clone(), Cycle::new(a.cycle_id.clone(), call.today()));
    state.active_cycle_id = Some(a.cycle_id.clone());
    tracing::info!(cycle_id = %a.cycle_id, day = %call.today(), "cycle started");

    if let Some(equation) = &a.equation {
        let goal_id = a
            .goal_id
            .clone()
            .unwrap_or_else(|| format!("goal-{}", a.cycle_id));
        compile_goal(state, call, &goal_id, equation)?;
    }
    Ok(())
}

fn set_active_cycle(state: &mut Snapshot, a: &SetActiveCycle) -> Outcome {
    let cycle = state.cycles.get(&a.cycle_id).ok_or_else(|| {
        Denial::new(DenialCode::CycleNotFound, format!("no cycle {}", a.cycle_id))
    })?;
    if !cycle.is_active() {
        return Err(Denial::new(
            DenialCode::CycleAlreadyEnded,
            format!("cycle {} has ended", a.cycle_id),
        ));
    }
    state.active_cycle_id = Some(a.cycle_id.clone());
    Ok(())
}

fn compile_goal_equation(state: &mut Snapshot, call: &Call<'_>, a: &CompileGoalEquation) -> Outcome {
    compile_goal(state, call, &a.goal_id, &a.equation)
}

/// Attach `equation` to the active cycle and run the admission gate.
fn compile_goal(state: &mut Snapshot, call: &Call<'_>, goal_id: &str, equation: &GoalEquation) -> Outcome {
    let policy = &call.config.constraints;
    let admission = with_workspace(state, |ws| {
        let busy = ws.busy_intervals(call.today(), policy.zone);
        let admission = admit_goal(
            Some(equation),
            &AdmissionContext {
                goal_id,
                cycle_id: &ws.cycle_id,
                now: call.now,
                policy,
                horizon_days: call.config.horizon_days,
                accepted: &busy,
            },
        );
        // A rejected goal is never attached; only its admission result is kept.
        ws.goal = admission.is_admitted().then(|| GoalDefinition {
            goal_id: goal_id.to_string(),
            equation: equation.clone(),
        });
        ws.auto_plan = None;
        ws.admission = Some(admission.clone());
        Ok(admission)
    })?;

    if !admission.is_admitted() {
        let reasons: Vec<String> = admission.reasons.iter().map(|r| format!("{r:?}")).collect();
        state.denials.push(Denial::new(
            DenialCode::GoalNotAdmitted,
            format!("{}: {}", admission.status, reasons.join(", ")),
        ));
        if admission.reasons.contains(&AdmissionReason::DeadlinePassed) {
            state
                .denials
                .push(Denial::new(DenialCode::DeadlinePassed, "deadline is not after today"));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Deliverables and criteria
// ═══════════════════════════════════════════════════════════════════════

fn create_deliverable(state: &mut Snapshot, a: &CreateDeliverable) -> Outcome {
    with_workspace(state, |ws| {
        if ws.deliverables.iter().all(|d| d.id != a.deliverable_id) {
            let mut deliverable = Deliverable::new(a.deliverable_id.clone(), a.title.clone(), a.required_blocks);
            deliverable.must_finish_by = a.must_finish_by;
            ws.deliverables.push(deliverable);
        }
        Ok(())
    })
}

fn delete_deliverable(state: &mut Snapshot, a: &DeleteDeliverable) -> Outcome {
    with_workspace(state, |ws| {
        ws.deliverables.retain(|d| d.id != a.deliverable_id);
        Ok(())
    })
}

fn create_criterion(state: &mut Snapshot, a: &CreateCriterion) -> Outcome {
    with_workspace(state, |ws| {
        let all = &mut ws.deliverables;
        let taken = all.iter().any(|d| d.criteria.iter().any(|c| c.id == a.criterion_id));
        if let Some(deliverable) = all.iter_mut().find(|d| d.id == a.deliverable_id) {
            if !taken {
                deliverable.criteria.push(Criterion {
                    id: a.criterion_id.clone(),
                    title: a.title.clone(),
                    done: false,
                });
            }
        }
        Ok(())
    })
}

fn toggle_criterion_done(state: &mut Snapshot, a: &ToggleCriterionDone) -> Outcome {
    with_workspace(state, |ws| {
        for deliverable in &mut ws.deliverables {
            if let Some(criterion) = deliverable.criterion_mut(&a.criterion_id) {
                criterion.done = !criterion.done;
            }
        }
        Ok(())
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Blocks
// ═══════════════════════════════════════════════════════════════════════

fn create_block(state: &mut Snapshot, call: &Call<'_>, a: &CreateBlock) -> Outcome {
    let start = instant(&a.start)?;
    let zone = call.config.constraints.zone;
    with_workspace(state, |ws| {
        let mut event = scoped_event(ws, EventKind::Create, &a.block_id)
            .with_window(start, a.minutes, zone)
            .with_link(a.deliverable_id.clone(), a.criterion_id.clone());
        event.label = a.label.clone();
        event.domain = a.domain;
        event.placement = a.placement;
        append(ws, event)
    })
}

fn update_block(state: &mut Snapshot, a: &UpdateBlock) -> Outcome {
    with_workspace(state, |ws| {
        let mut event = scoped_event(ws, EventKind::Update, &a.block_id);
        event.label = a.label.clone();
        event.domain = a.domain.unwrap_or_default();
        event.placement = a.placement;
        append(ws, event)
    })
}

fn reschedule_block(state: &mut Snapshot, call: &Call<'_>, a: &RescheduleBlock) -> Outcome {
    let start = instant(&a.start)?;
    let zone = call.config.constraints.zone;
    with_workspace(state, |ws| {
        let minutes = match a.minutes {
            Some(minutes) => minutes,
            None => ws
                .materialize(call.today(), zone)
                .block(&a.block_id)
                .map_or(0, |b| b.minutes()),
        };
        let event = scoped_event(ws, EventKind::Reschedule, &a.block_id).with_window(start, minutes, zone);
        append(ws, event)
    })
}

fn complete_block(state: &mut Snapshot, call: &Call<'_>, a: &BlockRef) -> Outcome {
    let zone = call.config.constraints.zone;
    with_workspace(state, |ws| {
        let view = ws.materialize(call.today(), zone);
        let block = view.block(&a.block_id).ok_or_else(|| {
            Denial::new(
                DenialCode::EventRefused,
                format!("complete on block {} refused: no live block", a.block_id),
            )
        })?;
        let mut event = scoped_event(ws, EventKind::Complete, &a.block_id)
            .with_window(block.start, block.minutes(), zone)
            .with_link(block.deliverable_id.clone(), block.criterion_id.clone());
        event.goal_id = block.goal_id.clone().or(event.goal_id);
        event.domain = block.domain;
        event.status = Some(BlockStatus::Completed);
        append(ws, event)
    })
}

fn delete_block(state: &mut Snapshot, a: &BlockRef) -> Outcome {
    with_workspace(state, |ws| {
        let event = scoped_event(ws, EventKind::Delete, &a.block_id);
        append(ws, event)
    })
}

fn link_block(state: &mut Snapshot, a: &LinkBlock) -> Outcome {
    with_workspace(state, |ws| {
        let event = scoped_event(ws, EventKind::Update, &a.block_id)
            .with_link(a.deliverable_id.clone(), a.criterion_id.clone());
        append(ws, event)
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Scheduling and suggestions
// ═══════════════════════════════════════════════════════════════════════

fn propose_schedule(state: &mut Snapshot, call: &Call<'_>, _a: &Tick) -> Outcome {
    let policy = &call.config.constraints;
    let today = call.today();
    let denials = with_workspace(state, |ws| {
        require_admitted(ws)?;
        let goal = ws
            .goal
            .clone()
            .ok_or_else(|| Denial::new(DenialCode::GoalNotAdmitted, "the active cycle has no goal"))?;
        if goal.equation.deadline.is_some_and(|d| d < today) {
            return Err(Denial::new(
                DenialCode::DeadlinePassed,
                format!("deadline passed before {today}"),
            ));
        }

        let proof = derive_plan_proof(&goal.equation, today);
        let busy = ws.busy_intervals(today, policy.zone);
        let plan = compile_auto_plan(&ScheduleRequest {
            goal_id: &goal.goal_id,
            cycle_id: &ws.cycle_id,
            plan_proof: &proof,
            policy,
            now: call.now,
            horizon_days: call.config.horizon_days,
            accepted: &busy,
        });

        let generation = ws.ledger.len();
        ws.suggestions.retain(|s| !s.is_pending());
        for block in &plan.blocks {
            ws.suggestions.push(SuggestedBlock {
                id: format!("sug-{generation}-{}", block.id.trim_start_matches("blk-")),
                goal_id: goal.goal_id.clone(),
                day: block.day,
                start: block.start,
                minutes: block.minutes,
                title: block.title.clone(),
                status: SuggestionStatus::Suggested,
            });
        }

        let mut denials = Vec::new();
        if plan.blocks.is_empty() {
            denials.push(Denial::new(DenialCode::NoProposedBlocks, "no session could be placed"));
        } else if plan.has_conflicts() {
            denials.push(Denial::new(
                DenialCode::PlanUnschedulable,
                format!("{} of the drafted sessions could not be placed", plan.conflicts.len()),
            ));
        }
        for code in plan.conflict_codes() {
            let denial = DenialCode::from_conflict(code);
            if !denials.iter().any(|d: &Denial| d.code == denial) {
                denials.push(Denial::new(denial, code.to_string()));
            }
        }

        ws.auto_plan = Some(plan);
        Ok(denials)
    })?;
    state.denials.extend(denials);
    Ok(())
}

/// Create the block for one suggestion unless the ledger already has it.
fn accept(ws: &mut Workspace, suggestion_id: &str, call: &Call<'_>) -> Outcome {
    let suggestion = ws
        .suggestions
        .iter()
        .find(|s| s.id == suggestion_id)
        .cloned()
        .ok_or_else(|| {
            Denial::new(
                DenialCode::SuggestionNotFound,
                format!("no suggestion {suggestion_id}"),
            )
        })?;

    if !ws.suggestion_created(suggestion_id) {
        let block_id = suggestion.block_id();
        let mut event = scoped_event(ws, EventKind::Create, &block_id).with_window(
            suggestion.start,
            suggestion.minutes,
            call.config.constraints.zone,
        );
        event.suggestion_id = Some(suggestion.id.clone());
        event.goal_id = Some(suggestion.goal_id.clone());
        event.origin = Origin::Suggestion;
        event.label = Some(suggestion.title.clone());
        append(ws, event)?;
    }
    if let Some(s) = ws.suggestion_mut(suggestion_id) {
        s.status = SuggestionStatus::Accepted;
    }
    Ok(())
}

fn accept_suggested_block(state: &mut Snapshot, call: &Call<'_>, a: &SuggestionRef) -> Outcome {
    with_workspace(state, |ws| {
        require_admitted(ws)?;
        accept(ws, &a.suggestion_id, call)
    })
}

fn accept_all_suggested_blocks(state: &mut Snapshot, call: &Call<'_>, _a: &Tick) -> Outcome {
    with_workspace(state, |ws| {
        require_admitted(ws)?;
        let pending: Vec<String> = ws
            .suggestions
            .iter()
            .filter(|s| s.is_pending())
            .map(|s| s.id.clone())
            .collect();
        if pending.is_empty() {
            return Err(Denial::new(DenialCode::NoProposedBlocks, "no pending suggestions"));
        }
        for id in &pending {
            accept(ws, id, call)?;
        }
        Ok(())
    })
}

fn reject_suggested_block(state: &mut Snapshot, a: &SuggestionRef) -> Outcome {
    with_workspace(state, |ws| {
        let suggestion = ws.suggestion_mut(&a.suggestion_id).ok_or_else(|| {
            Denial::new(
                DenialCode::SuggestionNotFound,
                format!("no suggestion {}", a.suggestion_id),
            )
        })?;
        suggestion.status = SuggestionStatus::Rejected;
        Ok(())
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Time
// ═══════════════════════════════════════════════════════════════════════

fn tick_now(state: &mut Snapshot, call: &Call<'_>, _a: &Tick) -> Outcome {
    let last = state.last_rollover_day;
    let zone = call.config.constraints.zone;
    if active_cycle(state).is_ok() {
        with_workspace(state, |ws| {
            let outcome = rollover_at_midnight(&ws.ledger, last, call.now, zone);
            outcome.apply(&mut ws.ledger);
            Ok(())
        })?;
    }
    state.last_rollover_day = Some(call.today());
    Ok(())
}

fn end_cycle(state: &mut Snapshot, call: &Call<'_>, _a: &Tick) -> Outcome {
    let cycle = active_cycle(state)?;
    let report = compute_terminal_convergence(&ConvergenceInput {
        deliverables: &cycle.deliverables,
        events: cycle.ledger.events(),
        deadline: cycle.deadline(),
        deadline_type: cycle.deadline_type(),
        tolerance: call.config.convergence_tolerance,
        now: call.now,
        zone: call.config.constraints.zone,
    });
    tracing::info!(
        cycle_id = %cycle.id,
        verdict = %report.verdict,
        deficits = report.reasons.len(),
        "cycle ended"
    );
    let ended = Cycle {
        status: CycleStatus::Ended,
        end_day: Some(call.today()),
        summary: Some(summarize_cycle(cycle.ledger.events())),
        convergence: Some(report),
        ..cycle.clone()
    };
    state.cycles.insert(ended.id.clone(), ended);
    state.active_cycle_id = None;
    Ok(())
}
