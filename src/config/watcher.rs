//! Configuration file watcher for hot reload of the static destination list.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;
use crate::destination::DestinationEntry;
use crate::reconcile::{Proposal, ProposalSource, ReconcileHandle};

/// Monitors the configuration file and emits every successfully reloaded config.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!("Config file change detected, reloading...");
                    match load_config(&path) {
                        Ok(new_config) => {
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload config: {}. Keeping current destinations.", e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Turn reloaded configs into static proposals until shutdown.
///
/// `applied` is the static list already committed at startup. A reload only
/// proposes when its static list differs from the last one applied, so edits
/// to other fields leave an admin-pushed set alone.
pub async fn apply_reloads(
    mut updates: mpsc::UnboundedReceiver<RelayConfig>,
    handle: ReconcileHandle,
    mut applied: Vec<DestinationEntry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                let entries = config.forward.static_destinations;
                if entries == applied {
                    tracing::debug!("Static destinations unchanged, reload ignored");
                    continue;
                }
                applied = entries.clone();
                let proposal = Proposal::from_entries(ProposalSource::Static, entries);
                match handle.propose(proposal).await {
                    Ok(receipt) => {
                        tracing::info!(generation = receipt.generation, destinations = receipt.destinations, "Static destinations reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to apply reloaded destinations");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
