//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Bind the relay socket and the admin listener
//! - Commit the static destination set before traffic is relayed
//! - Start background tasks (engine, health checks, admin API, config reload)
//!
//! # Design Decisions
//! - Fail fast: any bind error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The static set is committed before the engine, checker, admin API and
//!   reload loop start, so no other proposal can precede it
//! - Every task's shutdown receiver exists before the first await, so an early
//!   trigger is never missed

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::watcher::{apply_reloads, ConfigWatcher};
use crate::config::RelayConfig;
use crate::destination::DestinationRegistry;
use crate::health::{DnsProbe, HealthChecker, Probe, ProbeError};
use crate::lifecycle::Shutdown;
use crate::reconcile::{Proposal, ProposalSource, ReconcileError, ReconcileHandle, ReconciliationController};
use crate::relay::{LoggingObserver, RelayEngine, RelayError};

/// How long stopped tasks get to finish before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("failed to bind admin API on {addr}: {source}")]
    AdminBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("health check probe: {0}")]
    Probe(#[from] ProbeError),
    #[error("initial destination set not committed: {0}")]
    Reconcile(#[from] ReconcileError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// A bound, not yet running relay with every subsystem wired together.
pub struct Relay {
    config: RelayConfig,
    registry: Arc<DestinationRegistry>,
    engine: Arc<RelayEngine>,
    controller: ReconciliationController,
    handle: ReconcileHandle,
    admin_listener: Option<TcpListener>,
    admin_addr: Option<SocketAddr>,
    config_path: Option<PathBuf>,
}

impl Relay {
    pub async fn bind(config: RelayConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Invalid)?;

        let registry = Arc::new(DestinationRegistry::new());
        let (controller, handle) = ReconciliationController::new(registry.clone());

        let engine = RelayEngine::bind(
            config.forward.bind_address(),
            registry.clone(),
            Arc::new(LoggingObserver),
            Duration::from_millis(config.forward.idle_timeout_ms),
        )
        .await?;

        let (admin_listener, admin_addr) = if config.admin.enabled {
            let addr = config.admin.bind_address.clone();
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| StartupError::AdminBind {
                    addr: addr.clone(),
                    source,
                })?;
            let local = listener
                .local_addr()
                .map_err(|source| StartupError::AdminBind { addr, source })?;
            tracing::info!(address = %local, "Admin API bound");
            (Some(listener), Some(local))
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            registry,
            engine: Arc::new(engine),
            controller,
            handle,
            admin_listener,
            admin_addr,
            config_path: None,
        })
    }

    /// Re-propose the static destinations whenever `path` changes.
    pub fn watch_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.engine.local_addr()
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn registry(&self) -> &Arc<DestinationRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<RelayEngine> {
        &self.engine
    }

    pub fn handle(&self) -> &ReconcileHandle {
        &self.handle
    }

    /// Run with DNS health probes until `shutdown` is triggered.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), StartupError> {
        let probe = if self.config.health_check.enabled() {
            Some(DnsProbe::new(self.config.health_check.domain.clone())?)
        } else {
            None
        };
        self.run_with_probe(shutdown, probe).await
    }

    /// Run until `shutdown` is triggered. Health checks only start when
    /// enabled in config and a probe is supplied.
    pub async fn run_with_probe<P: Probe>(
        self,
        shutdown: Shutdown,
        probe: Option<P>,
    ) -> Result<(), StartupError> {
        let Relay {
            config,
            engine,
            controller,
            handle,
            admin_listener,
            config_path,
            ..
        } = self;

        // Every receiver exists before the first await, so an early trigger
        // reaches tasks spawned after the initial commit.
        let mut stopped = shutdown.subscribe();
        let engine_rx = shutdown.subscribe();
        let health_rx = shutdown.subscribe();
        let mut admin_rx = shutdown.subscribe();
        let reload_rx = shutdown.subscribe();

        let mut tasks = JoinSet::new();
        tasks.spawn(controller.run(shutdown.subscribe()));

        // The static set is committed before any other source can propose.
        let startup_entries = config.forward.static_destinations;
        let initial = Proposal::from_entries(ProposalSource::Static, startup_entries.clone());
        let receipt = match handle.propose(initial).await {
            Ok(receipt) => receipt,
            Err(e) => {
                shutdown.trigger();
                drain(tasks).await;
                return Err(e.into());
            }
        };

        {
            let engine = engine.clone();
            tasks.spawn(async move { engine.run(engine_rx).await });
        }

        if let Some(probe) = probe.filter(|_| config.health_check.enabled()) {
            let checker = HealthChecker::new(handle.clone(), probe, &config.health_check);
            tasks.spawn(checker.run(health_rx));
        } else {
            tracing::info!("Active health checks disabled");
        }

        if let Some(listener) = admin_listener {
            let state = AdminState::new(handle.clone(), engine.clone(), config.admin.token.clone());
            let router = setup_admin_router(state);
            tasks.spawn(async move {
                let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                    let _ = admin_rx.recv().await;
                });
                if let Err(e) = server.await {
                    tracing::error!(error = %e, "Admin API server failed");
                }
            });
        }

        // Dropping the notify handle stops the watch; it lives until run returns.
        let _watcher = match config_path {
            Some(path) => {
                let (watcher, updates) = ConfigWatcher::new(&path);
                match watcher.run() {
                    Ok(watcher) => {
                        tasks.spawn(apply_reloads(updates, handle.clone(), startup_entries, reload_rx));
                        Some(watcher)
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Config hot reload unavailable");
                        None
                    }
                }
            }
            None => None,
        };

        tracing::info!(
            address = %engine.local_addr(),
            destinations = receipt.destinations,
            skipped = receipt.skipped,
            "Relay running"
        );

        let _ = stopped.recv().await;
        tracing::info!("Shutting down relay");
        drain(tasks).await;
        tracing::info!("Relay stopped");
        Ok(())
    }
}

async fn drain(mut tasks: JoinSet<()>) {
    let finished = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Relay task failed");
            }
        }
    })
    .await;

    if finished.is_err() {
        tracing::warn!(remaining = tasks.len(), "Shutdown grace period elapsed, aborting tasks");
        tasks.abort_all();
    }
}
