//! Reconciliation proposals.

use serde::Serialize;

use crate::destination::{Destination, DestinationEntry};

/// Where a proposal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSource {
    /// Static list from the configuration file.
    Static,
    /// Administrative push.
    Admin,
    /// Filtered baseline produced by a health-check cycle.
    HealthCheck,
}

impl ProposalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalSource::Static => "static",
            ProposalSource::Admin => "admin",
            ProposalSource::HealthCheck => "healthcheck",
        }
    }

    /// Static and admin proposals define the baseline set.
    pub fn is_authoritative(self) -> bool {
        !matches!(self, ProposalSource::HealthCheck)
    }
}

impl std::fmt::Display for ProposalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete candidate destination set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    source: ProposalSource,
    destinations: Vec<Destination>,
    basis: Option<u64>,
    skipped: usize,
}

impl Proposal {
    pub fn new(source: ProposalSource, destinations: Vec<Destination>) -> Self {
        Self {
            source,
            destinations,
            basis: None,
            skipped: 0,
        }
    }

    /// Build from raw entries. Malformed entries are logged and skipped; the
    /// rest of the proposal still applies.
    pub fn from_entries<I>(source: ProposalSource, entries: I) -> Self
    where
        I: IntoIterator<Item = DestinationEntry>,
    {
        let mut destinations = Vec::new();
        let mut skipped = 0;
        for entry in entries {
            match Destination::try_from(entry) {
                Ok(destination) => destinations.push(destination),
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Skipping malformed destination entry");
                    skipped += 1;
                }
            }
        }
        Self {
            source,
            destinations,
            basis: None,
            skipped,
        }
    }

    /// Health-check result derived from baseline revision `basis`.
    pub fn health_check(basis: u64, healthy: Vec<Destination>) -> Self {
        Self {
            source: ProposalSource::HealthCheck,
            destinations: healthy,
            basis: Some(basis),
            skipped: 0,
        }
    }

    /// Count entries the caller already rejected before building the proposal.
    pub fn with_skipped(mut self, rejected: usize) -> Self {
        self.skipped += rejected;
        self
    }

    pub fn source(&self) -> ProposalSource {
        self.source
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn basis(&self) -> Option<u64> {
        self.basis
    }

    /// Entries rejected while building the proposal.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub(crate) fn into_parts(self) -> (ProposalSource, Vec<Destination>, Option<u64>, usize) {
        (self.source, self.destinations, self.basis, self.skipped)
    }
}
