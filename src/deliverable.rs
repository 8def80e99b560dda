//! Deliverables and criteria: the success definition a cycle is judged by.
//!
//! The kernel treats their ids as opaque linkage keys. A completed block only
//! counts toward a deliverable when its event names the deliverable or one of
//! its criteria.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ledger::ExecutionEvent;
use crate::time::DayKey;

/// A checkable acceptance item under a deliverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

/// A unit of output with a required number of work blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: String,
    pub title: String,
    pub required_blocks: u32,
    /// Sub-deadline for this deliverable alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_finish_by: Option<DayKey>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Deliverable {
    pub fn new(id: impl Into<String>, title: impl Into<String>, required_blocks: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            required_blocks,
            must_finish_by: None,
            criteria: Vec::new(),
        }
    }

    /// Whether `event` is linked to this deliverable directly or via a criterion.
    pub fn owns(&self, event: &ExecutionEvent) -> bool {
        if event.deliverable_id.as_deref() == Some(self.id.as_str()) {
            return true;
        }
        match event.criterion_id.as_deref() {
            Some(criterion) => self.criteria.iter().any(|c| c.id == criterion),
            None => false,
        }
    }

    /// Linked completion events for this deliverable, optionally only those
    /// on or before `through`.
    pub fn linked_completions<'a>(
        &'a self,
        events: &'a [ExecutionEvent],
        through: Option<DayKey>,
        zone: Tz,
    ) -> impl Iterator<Item = &'a ExecutionEvent> + 'a {
        events.iter().filter(move |e| {
            e.is_completion()
                && self.owns(e)
                && match (through, e.effective_day(zone)) {
                    (Some(limit), Some(day)) => day <= limit,
                    _ => true,
                }
        })
    }

    pub fn criterion_mut(&mut self, id: &str) -> Option<&mut Criterion> {
        self.criteria.iter_mut().find(|c| c.id == id)
    }
}

/// Find the deliverable owning `criterion_id`.
pub fn deliverable_for_criterion<'a>(
    deliverables: &'a [Deliverable],
    criterion_id: &str,
) -> Option<&'a Deliverable> {
    deliverables
        .iter()
        .find(|d| d.criteria.iter().any(|c| c.id == criterion_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EventKind;

    fn done(id: &str, deliverable: Option<&str>, criterion: Option<&str>, day: &str) -> ExecutionEvent {
        let mut e = ExecutionEvent::new(id, id, EventKind::Complete)
            .with_link(deliverable.map(String::from), criterion.map(String::from));
        e.day_key = Some(DayKey::parse(day).unwrap());
        e
    }

    fn chapter() -> Deliverable {
        let mut d = Deliverable::new("d1", "Chapter 1", 2);
        d.criteria.push(Criterion {
            id: "c1".into(),
            title: "Draft".into(),
            done: false,
        });
        d
    }

    #[test]
    fn owns_by_deliverable_or_criterion() {
        let d = chapter();
        assert!(d.owns(&done("a", Some("d1"), None, "2026-03-10")));
        assert!(d.owns(&done("b", None, Some("c1"), "2026-03-10")));
        assert!(!d.owns(&done("c", Some("d2"), None, "2026-03-10")));
        assert!(!d.owns(&done("e", None, None, "2026-03-10")));
    }

    #[test]
    fn linked_completions_respect_cutoff() {
        let d = chapter();
        let events = vec![
            done("a", Some("d1"), None, "2026-03-10"),
            done("b", Some("d1"), None, "2026-03-12"),
            ExecutionEvent::new("x", "x", EventKind::Create).with_link(Some("d1".into()), None),
        ];
        let cutoff = Some(DayKey::parse("2026-03-11").unwrap());
        assert_eq!(d.linked_completions(&events, cutoff, chrono_tz::UTC).count(), 1);
        assert_eq!(d.linked_completions(&events, None, chrono_tz::UTC).count(), 2);
    }

    #[test]
    fn criterion_lookup() {
        let ds = vec![chapter()];
        assert_eq!(deliverable_for_criterion(&ds, "c1").map(|d| d.id.as_str()), Some("d1"));
        assert!(deliverable_for_criterion(&ds, "nope").is_none());
    }
}
