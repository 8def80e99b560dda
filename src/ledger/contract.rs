//! Execution contract: the legality gate every ledger append passes through.
//!
//! Legality is judged against a per-block snapshot folded from the existing
//! ledger. Refusal is a plain `false`; callers decide whether to surface it.

use std::collections::HashMap;

use super::{EventKind, ExecutionEvent};

/// What the ledger says about one block id so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegalitySnapshot {
    pub exists: bool,
    pub deleted: bool,
    pub completed: bool,
}

impl LegalitySnapshot {
    /// The snapshot after `kind` lands on the block. A delete is final.
    pub fn advance(self, kind: EventKind) -> Self {
        if kind == EventKind::Delete {
            return Self {
                exists: false,
                deleted: true,
                completed: false,
            };
        }
        if self.deleted {
            return self;
        }
        match kind {
            EventKind::Create => Self { exists: true, ..self },
            EventKind::Complete => Self {
                exists: true,
                completed: true,
                ..self
            },
            EventKind::Update | EventKind::Reschedule | EventKind::Missed | EventKind::Delete => self,
        }
    }

    /// Whether `event` may follow a block in this state.
    pub fn permits(self, event: &ExecutionEvent) -> bool {
        if event.block_id.is_empty() {
            return false;
        }
        match event.kind {
            EventKind::Create => !self.exists && !self.deleted,
            EventKind::Delete => true,
            EventKind::Update => {
                self.exists
                    && !self.deleted
                    && event.day_key.is_none()
                    && event.start.is_none()
                    && event.end.is_none()
            }
            EventKind::Reschedule | EventKind::Complete | EventKind::Missed => self.exists && !self.deleted,
        }
    }
}

/// Fold the ledger into a legality snapshot per block id.
pub fn legality_snapshot(events: &[ExecutionEvent]) -> HashMap<&str, LegalitySnapshot> {
    let mut map: HashMap<&str, LegalitySnapshot> = HashMap::new();
    for event in events.iter().filter(|e| !e.block_id.is_empty()) {
        let entry = map.entry(event.block_id.as_str()).or_default();
        *entry = entry.advance(event.kind);
    }
    map
}

/// Whether `event` may be appended after `events`.
pub fn can_emit(events: &[ExecutionEvent], event: &ExecutionEvent) -> bool {
    legality_snapshot(events)
        .get(event.block_id.as_str())
        .copied()
        .unwrap_or_default()
        .permits(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_instant;

    fn ev(kind: EventKind) -> ExecutionEvent {
        ExecutionEvent::new(format!("e-{kind}"), "b1", kind)
    }

    fn created() -> Vec<ExecutionEvent> {
        vec![ev(EventKind::Create)]
    }

    #[test]
    fn create_requires_fresh_id() {
        assert!(can_emit(&[], &ev(EventKind::Create)));
        assert!(!can_emit(&created(), &ev(EventKind::Create)));
    }

    #[test]
    fn deleted_ids_can_never_be_recreated() {
        let mut events = created();
        events.push(ev(EventKind::Delete));
        assert!(!can_emit(&events, &ev(EventKind::Create)));
        assert!(!can_emit(&events, &ev(EventKind::Complete)));
        assert!(!can_emit(&events, &ev(EventKind::Reschedule)));
        // Deleting again is harmless.
        assert!(can_emit(&events, &ev(EventKind::Delete)));
    }

    #[test]
    fn update_must_not_move_the_block() {
        assert!(can_emit(&created(), &ev(EventKind::Update)));
        let mut moving = ev(EventKind::Update);
        moving.start = Some(parse_instant("2026-03-10T10:00:00Z").unwrap());
        assert!(!can_emit(&created(), &moving));
    }

    #[test]
    fn mutations_require_existing_block() {
        for kind in [
            EventKind::Update,
            EventKind::Reschedule,
            EventKind::Complete,
            EventKind::Missed,
        ] {
            assert!(!can_emit(&[], &ev(kind)), "{kind} on unknown id");
            assert!(can_emit(&created(), &ev(kind)), "{kind} on existing id");
        }
    }

    #[test]
    fn snapshot_tracks_completion() {
        let mut events = created();
        events.push(ev(EventKind::Complete));
        let snap = legality_snapshot(&events);
        assert_eq!(
            snap["b1"],
            LegalitySnapshot {
                exists: true,
                deleted: false,
                completed: true
            }
        );
    }
}
