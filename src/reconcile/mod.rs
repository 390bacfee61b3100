//! Destination-set reconciliation.
//!
//! # Data Flow
//! ```text
//! Static config (startup, reload) ─┐
//! Admin push (HTTP)               ─┼→ ReconcileHandle::propose
//! Health checker tick             ─┘        │ (mpsc, arrival order)
//!                                           ▼
//!                               controller.rs (single task)
//!                                   → dedupe names
//!                                   → registry.commit (full replace)
//!                                   → baseline update (static/admin only)
//! ```
//!
//! # Design Decisions
//! - One writer: the controller task is the only committer
//! - Full replace, never a field-level merge between sources
//! - Health proposals are tied to the baseline revision they narrowed and are
//!   dropped as stale once a newer baseline exists

pub mod controller;
pub mod proposal;

pub use controller::{Baseline, CommitReceipt, ReconcileError, ReconcileHandle, ReconciliationController};
pub use proposal::{Proposal, ProposalSource};
