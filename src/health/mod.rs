//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (active.rs)
//!     → baseline set from the reconciliation controller
//!     → probe.rs (one bounded probe per destination, concurrent)
//!     → healthy subset, baseline order kept
//!     → health-check proposal → controller → registry
//! ```
//!
//! # Design Decisions
//! - Probe failures mean "unhealthy", never an error of the checker
//! - An all-unhealthy cycle still proposes the empty set
//! - The baseline, not the narrowed snapshot, is probed so recovered
//!   destinations come back on the next cycle

pub mod active;
pub mod probe;

pub use active::HealthChecker;
pub use probe::{DnsProbe, Probe, ProbeError};
