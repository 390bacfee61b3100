//! UDP relay subsystem.
//!
//! # Data Flow
//! ```text
//! Client datagram
//!     → engine.rs (inbound read loop)
//!     → registry snapshot (one load per datagram)
//!     → resolver.rs (cached address; hostnames resolve in background tasks)
//!     → session.rs (get or create session per destination)
//!     → upstream socket send (one per destination)
//!
//! Upstream reply
//!     → per-session reader (engine.rs)
//!     → session.rs touch
//!     → inbound socket send_to(original client)
//! ```
//!
//! # Design Decisions
//! - The engine only reads the registry; it never blocks on reconciliation
//! - The engine never waits on name resolution
//! - A failed send to one destination never aborts the rest of the fan-out
//! - The sweep, not socket read deadlines, decides when a session dies

pub mod engine;
pub mod observer;
pub mod resolver;
pub mod session;

use std::net::SocketAddr;

pub use engine::RelayEngine;
pub use observer::{ConnectionObserver, LoggingObserver};
pub use resolver::{AddressBook, Lookup, Resolver, SystemResolver};
pub use session::{SessionKey, SessionStats, SessionTracker};

/// Relay engine errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind relay socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve destination {destination}: {source}")]
    Resolve {
        destination: String,
        #[source]
        source: std::io::Error,
    },
    #[error("destination {0} resolved to no addresses")]
    NoAddress(String),
    #[error("failed to open session socket for {destination}: {source}")]
    SessionSocket {
        destination: String,
        #[source]
        source: std::io::Error,
    },
}
