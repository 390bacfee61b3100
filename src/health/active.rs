//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every destination of the baseline set
//! - Submit the healthy subset as a health-check proposal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::destination::Destination;
use crate::health::probe::{Probe, ProbeError};
use crate::observability::metrics;
use crate::reconcile::{CommitReceipt, Proposal, ReconcileError, ReconcileHandle};

pub struct HealthChecker<P> {
    handle: ReconcileHandle,
    probe: Arc<P>,
    period: Duration,
    timeout: Duration,
}

impl<P: Probe> HealthChecker<P> {
    pub fn new(handle: ReconcileHandle, probe: P, config: &HealthCheckConfig) -> Self {
        Self::with_timing(
            handle,
            probe,
            Duration::from_millis(config.period_ms),
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub fn with_timing(handle: ReconcileHandle, probe: P, period: Duration, timeout: Duration) -> Self {
        Self {
            handle,
            probe: Arc::new(probe),
            period,
            timeout,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.period.is_zero() {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(period = ?self.period, timeout = ?self.timeout, "Health checker starting");

        // First check one full period after startup.
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.check_once().await {
                        Ok(Some(receipt)) => {
                            tracing::info!(healthy = receipt.destinations, generation = receipt.generation, "Health check completed");
                        }
                        Ok(None) => {}
                        Err(ReconcileError::Stale { basis, current }) => {
                            tracing::debug!(basis, current, "Baseline changed during health check, result dropped");
                        }
                        Err(ReconcileError::Closed) => {
                            tracing::warn!("Reconciliation controller gone, health checker stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health checker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One cycle: probe the baseline and propose the survivors. `None` when
    /// no baseline has been established yet.
    pub async fn check_once(&self) -> Result<Option<CommitReceipt>, ReconcileError> {
        let baseline = self.handle.baseline();
        if baseline.revision == 0 {
            tracing::trace!("No baseline yet, skipping health check");
            return Ok(None);
        }

        let healthy = self.probe_all(&baseline.destinations).await;
        let receipt = self
            .handle
            .propose(Proposal::health_check(baseline.revision, healthy))
            .await?;
        Ok(Some(receipt))
    }

    /// Probe concurrently; the result keeps the input order.
    pub async fn probe_all(&self, destinations: &[Destination]) -> Vec<Destination> {
        let mut probes = JoinSet::new();
        for (index, destination) in destinations.iter().cloned().enumerate() {
            let probe = self.probe.clone();
            let timeout = self.timeout;
            probes.spawn(async move {
                let outcome = match time::timeout(timeout, probe.probe(&destination)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(timeout)),
                };
                (index, destination, outcome)
            });
        }

        let mut healthy = Vec::with_capacity(destinations.len());
        while let Some(joined) = probes.join_next().await {
            let (index, destination, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "Health probe task failed");
                    continue;
                }
            };
            metrics::record_probe(destination.name(), outcome.is_ok());
            match outcome {
                Ok(()) => healthy.push((index, destination)),
                Err(e) => {
                    tracing::warn!(destination = %destination, error = %e, "Health check failed");
                }
            }
        }

        healthy.sort_unstable_by_key(|(index, _)| *index);
        healthy.into_iter().map(|(_, d)| d).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::DestinationRegistry;
    use crate::lifecycle::Shutdown;
    use crate::reconcile::{ProposalSource, ReconciliationController};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Fails destinations listed in `down`; hangs for those in `hang`.
    #[derive(Default)]
    struct ScriptedProbe {
        down: Mutex<HashSet<String>>,
        hang: HashSet<String>,
    }

    impl Probe for ScriptedProbe {
        async fn probe(&self, destination: &Destination) -> Result<(), ProbeError> {
            if self.hang.contains(destination.name()) {
                std::future::pending::<()>().await;
            }
            if self.down.lock().unwrap().contains(destination.name()) {
                return Err(ProbeError::EmptyAnswer);
            }
            Ok(())
        }
    }

    fn dest(name: &str, address: &str) -> Destination {
        Destination::new(name, address).unwrap()
    }

    fn setup(probe: ScriptedProbe) -> (Arc<DestinationRegistry>, ReconcileHandle, HealthChecker<ScriptedProbe>, Shutdown) {
        let registry = Arc::new(DestinationRegistry::new());
        let (controller, handle) = ReconciliationController::new(registry.clone());
        let shutdown = Shutdown::new();
        tokio::spawn(controller.run(shutdown.subscribe()));
        let checker = HealthChecker::with_timing(
            handle.clone(),
            probe,
            Duration::from_millis(50),
            Duration::from_millis(100),
        );
        (registry, handle, checker, shutdown)
    }

    fn abc() -> Vec<Destination> {
        vec![
            dest("a", "10.0.0.1:53"),
            dest("b", "10.0.0.2:53"),
            dest("c", "10.0.0.3:53"),
        ]
    }

    #[tokio::test]
    async fn skips_until_a_baseline_exists() {
        let (_registry, _handle, checker, _shutdown) = setup(ScriptedProbe::default());
        assert_eq!(checker.check_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn drops_unhealthy_and_reinstates_recovered() {
        let probe = ScriptedProbe::default();
        probe.down.lock().unwrap().insert("b".into());
        let (registry, handle, checker, _shutdown) = setup(probe);
        handle.propose(Proposal::new(ProposalSource::Static, abc())).await.unwrap();

        checker.check_once().await.unwrap();
        let names: Vec<_> = registry.current().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, ["a", "c"]);

        checker.probe.down.lock().unwrap().clear();
        checker.check_once().await.unwrap();
        assert_eq!(registry.current().destinations, abc());
    }

    #[tokio::test]
    async fn all_unhealthy_commits_empty_set() {
        let probe = ScriptedProbe::default();
        probe.down.lock().unwrap().extend(["a", "b", "c"].map(String::from));
        let (registry, handle, checker, _shutdown) = setup(probe);
        handle.propose(Proposal::new(ProposalSource::Static, abc())).await.unwrap();

        let receipt = checker.check_once().await.unwrap().unwrap();
        assert_eq!(receipt.destinations, 0);
        assert!(registry.current().is_empty());
    }

    #[tokio::test]
    async fn hung_probe_counts_as_unhealthy_without_delaying_others() {
        let probe = ScriptedProbe {
            hang: HashSet::from(["a".to_string()]),
            ..Default::default()
        };
        let (_registry, _handle, checker, _shutdown) = setup(probe);

        let started = Instant::now();
        let healthy = checker.probe_all(&abc()).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(healthy, abc()[1..].to_vec());
    }

    #[tokio::test]
    async fn run_loop_applies_results_and_stops_on_shutdown() {
        let probe = ScriptedProbe::default();
        probe.down.lock().unwrap().insert("c".into());
        let (registry, handle, checker, shutdown) = setup(probe);
        handle.propose(Proposal::new(ProposalSource::Static, abc())).await.unwrap();

        let run = tokio::spawn(checker.run(shutdown.subscribe()));
        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.current().len(), 2);

        shutdown.trigger();
        time::timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
    }
}
