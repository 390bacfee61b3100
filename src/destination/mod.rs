//! Forwarding destinations.
//!
//! # Data Flow
//! ```text
//! Raw entry (config / admin JSON)
//!     → Destination::new (syntactic checks: non-empty name, host:port)
//!     → Proposal (reconcile)
//!     → registry.rs (committed snapshot)
//!     → relay engine fan-out
//! ```
//!
//! # Design Decisions
//! - A Destination is an immutable value; re-pointing a name builds a new one
//! - Addresses are kept as written (`host:port`), resolution happens when a
//!   session socket is opened

pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use registry::{DestinationRegistry, Snapshot};

/// Error returned for an entry that cannot become a [`Destination`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestinationError {
    #[error("destination name is empty")]
    EmptyName,
    #[error("destination {name:?} has an empty address")]
    EmptyAddress { name: String },
    #[error("destination {name:?} has invalid address {address:?}: {reason}")]
    InvalidAddress {
        name: String,
        address: String,
        reason: &'static str,
    },
}

/// A named forwarding target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
    name: String,
    #[serde(rename = "addr")]
    address: String,
}

impl Destination {
    /// Build a destination, rejecting empty names and addresses that are not
    /// syntactically `host:port`.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Result<Self, DestinationError> {
        let name = name.into();
        let address = address.into();

        if name.trim().is_empty() {
            return Err(DestinationError::EmptyName);
        }
        if address.trim().is_empty() {
            return Err(DestinationError::EmptyAddress { name });
        }
        if let Err(reason) = check_host_port(&address) {
            return Err(DestinationError::InvalidAddress { name, address, reason });
        }

        Ok(Self { name, address })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.address)
    }
}

/// Unvalidated `{name, addr}` pair as delivered by config files and the admin API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DestinationEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "addr", alias = "address")]
    pub address: String,
}

impl DestinationEntry {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl TryFrom<DestinationEntry> for Destination {
    type Error = DestinationError;

    fn try_from(entry: DestinationEntry) -> Result<Self, Self::Error> {
        Destination::new(entry.name, entry.address)
    }
}

fn check_host_port(address: &str) -> Result<(), &'static str> {
    let (host, port) = address.rsplit_once(':').ok_or("missing port")?;

    let host = if let Some(inner) = host.strip_prefix('[') {
        inner.strip_suffix(']').ok_or("unterminated IPv6 literal")?
    } else if host.contains(':') {
        return Err("IPv6 literal must be bracketed");
    } else {
        host
    };

    if host.is_empty() {
        return Err("missing host");
    }
    if host.chars().any(char::is_whitespace) {
        return Err("host contains whitespace");
    }
    port.parse::<u16>().map_err(|_| "port is not a number in 0-65535")?;
    Ok(())
}
