// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # jericho
//!
//! A deterministic planning kernel for deadline-bound goals. Every call is a
//! pure `(snapshot, action) -> snapshot` step: the caller supplies the
//! instant, the kernel appends execution events to an immutable ledger and
//! recomputes every view from it.
//!
//! ## Architecture
//!
//! - **Ledger** (`ledger`): Append-only execution events, the contract that
//!   gates them, and the materialized calendar
//! - **Rollover** (`rollover`): Midnight carry-forward of unfinished committed blocks
//! - **Goals** (`plan_proof`, `admission`): Required pace versus capacity, and
//!   the gate a goal must pass before any scheduling
//! - **Scheduling** (`constraints`, `scheduler`): Deterministic auto-placement
//!   inside working hours
//! - **Scoring** (`feasibility`, `probability`): Whether the remaining work
//!   fits, and how likely it is to land
//! - **Closure** (`convergence`, `learning`): Terminal verdicts and the
//!   cross-cycle profile
//! - **Kernel** (`kernel`): The closed action set and its dispatch
//!
//! ## Library usage
//!
//! ```no_run
//! use jericho::config::KernelConfig;
//! use jericho::kernel::{Action, Snapshot, compute};
//! use jericho::kernel::action::StartCycle;
//!
//! let config = KernelConfig::default();
//! let next = compute(
//!     &Snapshot::default(),
//!     &Action::StartCycle(StartCycle {
//!         now: "2026-03-10T08:00:00Z".into(),
//!         cycle_id: "c1".into(),
//!         goal_id: None,
//!         equation: None,
//!     }),
//!     &config,
//! );
//! assert_eq!(next.active_cycle_id.as_deref(), Some("c1"));
//! ```

pub mod admission;
pub mod config;
pub mod constraints;
pub mod convergence;
pub mod cycle;
pub mod deliverable;
pub mod error;
pub mod feasibility;
pub mod kernel;
pub mod learning;
pub mod ledger;
pub mod persist;
pub mod plan_proof;
pub mod probability;
pub mod rollover;
pub mod scheduler;
pub mod time;
