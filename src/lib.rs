//! UDP fan-out relay library.
//!
//! Every datagram received on the inbound socket is copied to each currently
//! active destination; replies are routed back to the client that caused them.

pub mod admin;
pub mod config;
pub mod destination;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod reconcile;
pub mod relay;

pub use config::schema::RelayConfig;
pub use destination::{Destination, DestinationRegistry, Snapshot};
pub use lifecycle::{Relay, Shutdown, StartupError};
pub use reconcile::{Proposal, ProposalSource, ReconcileHandle};
pub use relay::RelayEngine;
