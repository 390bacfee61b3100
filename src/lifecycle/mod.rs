//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Bind relay socket → Bind admin listener
//!     → Commit static destinations → Spawn engine, checker, admin, watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → every task leaves its loop → sessions closed → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: bind errors at startup are fatal
//! - In-flight datagrams are not drained (UDP makes no delivery promise)
//! - Shutdown has timeout: remaining tasks are aborted after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Relay, StartupError};
