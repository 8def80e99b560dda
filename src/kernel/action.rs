//! Inbound actions.
//!
//! A closed set, tagged on the wire by `"type"`. Every temporal field is an
//! RFC 3339 instant carried as text so a malformed one reaches the kernel
//! and can be refused as data.

use serde::{Deserialize, Serialize};

use crate::ledger::{Domain, Placement};
use crate::plan_proof::GoalEquation;
use crate::time::DayKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCycle {
    pub now: String,
    pub cycle_id: String,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub equation: Option<GoalEquation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetActiveCycle {
    pub now: String,
    pub cycle_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileGoalEquation {
    pub now: String,
    pub goal_id: String,
    pub equation: GoalEquation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDeliverable {
    pub now: String,
    pub deliverable_id: String,
    pub title: String,
    pub required_blocks: u32,
    #[serde(default)]
    pub must_finish_by: Option<DayKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteDeliverable {
    pub now: String,
    pub deliverable_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCriterion {
    pub now: String,
    pub deliverable_id: String,
    pub criterion_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleCriterionDone {
    pub now: String,
    pub criterion_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBlock {
    pub now: String,
    pub block_id: String,
    pub start: String,
    pub minutes: u32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub domain: Domain,
    #[serde(default)]
    pub placement: Option<Placement>,
    #[serde(default)]
    pub deliverable_id: Option<String>,
    #[serde(default)]
    pub criterion_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBlock {
    pub now: String,
    pub block_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub domain: Option<Domain>,
    #[serde(default)]
    pub placement: Option<Placement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescheduleBlock {
    pub now: String,
    pub block_id: String,
    pub start: String,
    /// Keeps the current duration when absent.
    #[serde(default)]
    pub minutes: Option<u32>,
}

/// Payload for actions that only name a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRef {
    pub now: String,
    pub block_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkBlock {
    pub now: String,
    pub block_id: String,
    #[serde(default)]
    pub deliverable_id: Option<String>,
    #[serde(default)]
    pub criterion_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRef {
    pub now: String,
    pub suggestion_id: String,
}

/// Payload for actions that only carry the current instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub now: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    StartCycle(StartCycle),
    SetActiveCycle(SetActiveCycle),
    CompileGoalEquation(CompileGoalEquation),
    CreateDeliverable(CreateDeliverable),
    DeleteDeliverable(DeleteDeliverable),
    CreateCriterion(CreateCriterion),
    ToggleCriterionDone(ToggleCriterionDone),
    CreateBlock(CreateBlock),
    UpdateBlock(UpdateBlock),
    RescheduleBlock(RescheduleBlock),
    CompleteBlock(BlockRef),
    DeleteBlock(BlockRef),
    LinkBlockToDeliverable(LinkBlock),
    ProposeSchedule(Tick),
    AcceptSuggestedBlock(SuggestionRef),
    AcceptAllSuggestedBlocks(Tick),
    RejectSuggestedBlock(SuggestionRef),
    TickNow(Tick),
    EndCycle(Tick),
    NoOp,
}

impl Action {
    /// The caller-supplied instant, absent only for `NO_OP`.
    pub fn now(&self) -> Option<&str> {
        let now = match self {
            Self::StartCycle(a) => &a.now,
            Self::SetActiveCycle(a) => &a.now,
            Self::CompileGoalEquation(a) => &a.now,
            Self::CreateDeliverable(a) => &a.now,
            Self::DeleteDeliverable(a) => &a.now,
            Self::CreateCriterion(a) => &a.now,
            Self::ToggleCriterionDone(a) => &a.now,
            Self::CreateBlock(a) => &a.now,
            Self::UpdateBlock(a) => &a.now,
            Self::RescheduleBlock(a) => &a.now,
            Self::CompleteBlock(a) | Self::DeleteBlock(a) => &a.now,
            Self::LinkBlockToDeliverable(a) => &a.now,
            Self::AcceptSuggestedBlock(a) | Self::RejectSuggestedBlock(a) => &a.now,
            Self::ProposeSchedule(a)
            | Self::AcceptAllSuggestedBlocks(a)
            | Self::TickNow(a)
            | Self::EndCycle(a) => &a.now,
            Self::NoOp => return None,
        };
        Some(now)
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::StartCycle(_) => "START_CYCLE",
            Self::SetActiveCycle(_) => "SET_ACTIVE_CYCLE",
            Self::CompileGoalEquation(_) => "COMPILE_GOAL_EQUATION",
            Self::CreateDeliverable(_) => "CREATE_DELIVERABLE",
            Self::DeleteDeliverable(_) => "DELETE_DELIVERABLE",
            Self::CreateCriterion(_) => "CREATE_CRITERION",
            Self::ToggleCriterionDone(_) => "TOGGLE_CRITERION_DONE",
            Self::CreateBlock(_) => "CREATE_BLOCK",
            Self::UpdateBlock(_) => "UPDATE_BLOCK",
            Self::RescheduleBlock(_) => "RESCHEDULE_BLOCK",
            Self::CompleteBlock(_) => "COMPLETE_BLOCK",
            Self::DeleteBlock(_) => "DELETE_BLOCK",
            Self::LinkBlockToDeliverable(_) => "LINK_BLOCK_TO_DELIVERABLE",
            Self::ProposeSchedule(_) => "PROPOSE_SCHEDULE",
            Self::AcceptSuggestedBlock(_) => "ACCEPT_SUGGESTED_BLOCK",
            Self::AcceptAllSuggestedBlocks(_) => "ACCEPT_ALL_SUGGESTED_BLOCKS",
            Self::RejectSuggestedBlock(_) => "REJECT_SUGGESTED_BLOCK",
            Self::TickNow(_) => "TICK_NOW",
            Self::EndCycle(_) => "END_CYCLE",
            Self::NoOp => "NO_OP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_wire_format() {
        let json = r#"{"type":"CREATE_BLOCK","now":"2026-03-10T08:00:00Z","block_id":"b1",
                       "start":"2026-03-10T09:00:00Z","minutes":60,"domain":"FOCUS"}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        let Action::CreateBlock(create) = &action else {
            panic!("expected CREATE_BLOCK, got {}", action.as_label());
        };
        assert_eq!(create.block_id, "b1");
        assert_eq!(create.domain, Domain::Focus);
        assert_eq!(action.now(), Some("2026-03-10T08:00:00Z"));

        let back = serde_json::to_value(&action).unwrap();
        assert_eq!(back["type"], "CREATE_BLOCK");
    }

    #[test]
    fn unit_variant() {
        let action: Action = serde_json::from_str(r#"{"type":"NO_OP"}"#).unwrap();
        assert_eq!(action, Action::NoOp);
        assert_eq!(action.now(), None);
    }
}
