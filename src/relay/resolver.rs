//! Destination address resolution off the relay path.
//!
//! # Responsibilities
//! - Turn `host:port` destination addresses into socket addresses
//! - Cache results per address, retry failures after a back-off
//!
//! # Design Decisions
//! - IP literals never reach the resolver
//! - Lookups run in spawned tasks; the inbound loop only reads the cache and
//!   drops datagrams for a destination whose address is not known yet
//! - Resolved entries are refreshed in the background after a TTL while the
//!   previous address stays in use

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::destination::{Destination, Snapshot};
use crate::relay::RelayError;

const RESOLVED_TTL: Duration = Duration::from_secs(60);
const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

pub type ResolveFuture = Pin<Box<dyn Future<Output = Result<SocketAddr, RelayError>> + Send>>;

/// Name resolution for destination addresses.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(&self, address: &str) -> ResolveFuture;
}

/// The operating system resolver via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, address: &str) -> ResolveFuture {
        let address = address.to_string();
        Box::pin(async move {
            let mut addrs = tokio::net::lookup_host(address.as_str())
                .await
                .map_err(|source| RelayError::Resolve {
                    destination: address.clone(),
                    source,
                })?;
            addrs.next().ok_or_else(|| RelayError::NoAddress(address.clone()))
        })
    }
}

/// Cached state of one destination address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Ready(SocketAddr),
    Pending,
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Pending,
    Resolved {
        addr: SocketAddr,
        at: Instant,
        refreshing: bool,
    },
    Failed {
        at: Instant,
    },
}

/// Address cache shared by the inbound loop and the lookup tasks.
pub struct AddressBook {
    resolver: Arc<dyn Resolver>,
    entries: Mutex<HashMap<String, Entry>>,
    synced_generation: AtomicU64,
}

impl AddressBook {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            entries: Mutex::new(HashMap::new()),
            synced_generation: AtomicU64::new(0),
        }
    }

    /// Never waits on the resolver. A missing or expired entry starts a
    /// background lookup.
    pub async fn lookup(self: &Arc<Self>, destination: &Destination) -> Lookup {
        let address = destination.address();
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Lookup::Ready(addr);
        }

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(address).copied() {
            Some(Entry::Resolved {
                addr,
                at,
                refreshing,
            }) => {
                if !refreshing && now.saturating_duration_since(at) > RESOLVED_TTL {
                    entries.insert(
                        address.to_string(),
                        Entry::Resolved {
                            addr,
                            at,
                            refreshing: true,
                        },
                    );
                    self.spawn_lookup(address.to_string());
                }
                Lookup::Ready(addr)
            }
            Some(Entry::Pending) => Lookup::Pending,
            Some(Entry::Failed { at }) if now.saturating_duration_since(at) < FAILURE_BACKOFF => {
                Lookup::Failed
            }
            _ => {
                entries.insert(address.to_string(), Entry::Pending);
                self.spawn_lookup(address.to_string());
                Lookup::Pending
            }
        }
    }

    /// Drop entries no longer named by `snapshot` and start lookups for new
    /// hostnames. Cheap when the generation has not moved.
    pub async fn sync(self: &Arc<Self>, snapshot: &Snapshot) {
        if self.synced_generation.swap(snapshot.generation, Ordering::AcqRel) == snapshot.generation {
            return;
        }

        let mut entries = self.entries.lock().await;
        entries.retain(|address, _| snapshot.iter().any(|d| d.address() == address));
        for destination in snapshot.iter() {
            let address = destination.address();
            if address.parse::<SocketAddr>().is_err() && !entries.contains_key(address) {
                entries.insert(address.to_string(), Entry::Pending);
                self.spawn_lookup(address.to_string());
            }
        }
    }

    fn spawn_lookup(self: &Arc<Self>, address: String) {
        let book = self.clone();
        tokio::spawn(async move {
            let result = book.resolver.resolve(&address).await;
            book.complete(&address, result).await;
        });
    }

    async fn complete(&self, address: &str, result: Result<SocketAddr, RelayError>) {
        let mut entries = self.entries.lock().await;
        // Removed by a sync while the lookup ran.
        let Some(entry) = entries.get_mut(address) else {
            return;
        };
        let now = Instant::now();

        *entry = match (result, *entry) {
            (Ok(addr), _) => {
                tracing::debug!(address, resolved = %addr, "Destination resolved");
                Entry::Resolved {
                    addr,
                    at: now,
                    refreshing: false,
                }
            }
            (Err(e), Entry::Resolved { addr, .. }) => {
                tracing::warn!(address, error = %e, previous = %addr, "Destination refresh failed, keeping previous address");
                Entry::Resolved {
                    addr,
                    at: now,
                    refreshing: false,
                }
            }
            (Err(e), _) => {
                tracing::warn!(address, error = %e, "Destination resolution failed");
                Entry::Failed { at: now }
            }
        };
    }
}
