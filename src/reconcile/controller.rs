//! Reconciliation controller: the single writer of the destination registry.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::destination::{Destination, DestinationRegistry};
use crate::observability::metrics;
use crate::reconcile::proposal::{Proposal, ProposalSource};

/// Pending proposals before `propose` callers start waiting for a slot.
const INTAKE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("reconciliation controller is not running")]
    Closed,
    #[error("health-check proposal built from baseline revision {basis}, current revision is {current}")]
    Stale { basis: u64, current: u64 },
}

/// Result of an applied proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub generation: u64,
    pub source: ProposalSource,
    pub destinations: usize,
    /// Malformed or duplicate entries left out of the commit.
    pub skipped: usize,
}

/// The authoritative set established by the latest static or admin proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    pub revision: u64,
    pub destinations: Vec<Destination>,
}

struct Request {
    proposal: Proposal,
    reply: oneshot::Sender<Result<CommitReceipt, ReconcileError>>,
}

/// Cloneable submission side of the controller.
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<Request>,
    baseline: Arc<ArcSwap<Baseline>>,
}

impl ReconcileHandle {
    /// Submit a proposal and wait until it is committed (or rejected).
    pub async fn propose(&self, proposal: Proposal) -> Result<CommitReceipt, ReconcileError> {
        let (reply, receipt) = oneshot::channel();
        self.tx
            .send(Request { proposal, reply })
            .await
            .map_err(|_| ReconcileError::Closed)?;
        receipt.await.map_err(|_| ReconcileError::Closed)?
    }

    /// Latest baseline, for the health checker to probe.
    pub fn baseline(&self) -> Arc<Baseline> {
        self.baseline.load_full()
    }
}

/// Applies proposals one at a time, in arrival order.
pub struct ReconciliationController {
    registry: Arc<DestinationRegistry>,
    rx: mpsc::Receiver<Request>,
    baseline: Arc<ArcSwap<Baseline>>,
}

impl ReconciliationController {
    pub fn new(registry: Arc<DestinationRegistry>) -> (Self, ReconcileHandle) {
        let (tx, rx) = mpsc::channel(INTAKE_CAPACITY);
        let baseline = Arc::new(ArcSwap::from_pointee(Baseline::default()));
        let handle = ReconcileHandle {
            tx,
            baseline: baseline.clone(),
        };
        (
            Self {
                registry,
                rx,
                baseline,
            },
            handle,
        )
    }

    /// Intake loop. Exits on shutdown or when every handle is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Reconciliation controller starting");

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(Request { proposal, reply }) => {
                        let outcome = self.apply(proposal);
                        // The proposer may have given up waiting; the commit stands.
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::info!("Reconciliation controller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn apply(&self, proposal: Proposal) -> Result<CommitReceipt, ReconcileError> {
        let (source, destinations, basis, mut skipped) = proposal.into_parts();
        let baseline = self.baseline.load();

        if let Some(basis) = basis {
            if basis != baseline.revision {
                tracing::debug!(basis, current = baseline.revision, "Discarding stale health-check proposal");
                return Err(ReconcileError::Stale {
                    basis,
                    current: baseline.revision,
                });
            }
        }

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(destinations.len());
        for destination in destinations {
            if seen.insert(destination.name().to_string()) {
                unique.push(destination);
            } else {
                tracing::warn!(%source, destination = %destination, "Skipping duplicate destination name");
                skipped += 1;
            }
        }

        let count = unique.len();
        let generation = if source.is_authoritative() {
            let generation = self.registry.commit(unique.clone());
            self.baseline.store(Arc::new(Baseline {
                revision: baseline.revision + 1,
                destinations: unique,
            }));
            generation
        } else {
            self.registry.commit(unique)
        };

        metrics::record_commit(source.as_str());
        tracing::info!(%source, generation, destinations = count, skipped, "Destination set committed");

        Ok(CommitReceipt {
            generation,
            source,
            destinations: count,
            skipped,
        })
    }
}
