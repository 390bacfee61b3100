//! Relay engine: inbound socket, fan-out and reply routing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::destination::{DestinationRegistry, Snapshot};
use crate::observability::metrics;
use crate::relay::observer::ConnectionObserver;
use crate::relay::resolver::{AddressBook, Lookup, Resolver, SystemResolver};
use crate::relay::session::{SessionKey, SessionTracker};
use crate::relay::RelayError;

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65_535;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// The running relay instance. Constructed once and shared by reference.
pub struct RelayEngine {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    registry: Arc<DestinationRegistry>,
    sessions: Arc<SessionTracker>,
    addresses: Arc<AddressBook>,
    idle_timeout: Duration,
}

impl RelayEngine {
    /// Bind the inbound socket. Failure here is fatal for startup.
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<DestinationRegistry>,
        observer: Arc<dyn ConnectionObserver>,
        idle_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| RelayError::Bind { addr, source })?;

        tracing::info!(address = %local_addr, idle_timeout = ?idle_timeout, "Relay socket bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            registry,
            sessions: Arc::new(SessionTracker::new(observer)),
            addresses: Arc::new(AddressBook::new(Arc::new(SystemResolver))),
            idle_timeout,
        })
    }

    /// Replace the system resolver used for hostname destinations.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.addresses = Arc::new(AddressBook::new(resolver));
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Currently committed destination snapshot.
    pub fn destinations(&self) -> Arc<Snapshot> {
        self.registry.current()
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Cadence of the idle sweep: a quarter of the idle timeout.
    pub fn sweep_interval(&self) -> Duration {
        (self.idle_timeout / 4).max(MIN_SWEEP_INTERVAL)
    }

    /// Read loop. Returns after the shutdown signal, with every session closed.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut sweep = time::interval(self.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(address = %self.local_addr, "Relay engine running");

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, client)) => {
                        self.fan_out(client, &buf[..len]).await;
                    }
                    Err(e) => {
                        // Some platforms surface ICMP errors from earlier sends here.
                        tracing::warn!(error = %e, "Inbound receive failed");
                    }
                },
                _ = sweep.tick() => {
                    self.sessions.sweep(Instant::now(), self.idle_timeout).await;
                    self.addresses.sync(&self.registry.current()).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Relay engine received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        self.close().await;
    }

    /// Replicate one client datagram to every destination of the current
    /// snapshot. Returns the number of successful sends.
    pub async fn fan_out(&self, client: SocketAddr, payload: &[u8]) -> usize {
        let snapshot = self.registry.current();
        metrics::record_datagram_received(payload.len());

        if snapshot.is_empty() {
            tracing::trace!(from = %client, "No destinations, datagram dropped");
            return 0;
        }

        self.addresses.sync(&snapshot).await;

        let mut sent = 0;
        for destination in snapshot.iter() {
            let remote = match self.addresses.lookup(destination).await {
                Lookup::Ready(remote) => remote,
                Lookup::Pending => {
                    tracing::debug!(from = %client, destination = %destination, "Destination address not resolved yet, datagram dropped");
                    metrics::record_forward(destination.name(), false);
                    continue;
                }
                Lookup::Failed => {
                    tracing::debug!(from = %client, destination = %destination, "Destination unresolvable, datagram dropped");
                    metrics::record_forward(destination.name(), false);
                    continue;
                }
            };

            let upstream = match self
                .sessions
                .get_or_create(client, destination, remote, |key, socket| self.spawn_reader(key, socket))
                .await
            {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::warn!(from = %client, destination = %destination, error = %e, "Session unavailable, datagram dropped");
                    metrics::record_forward(destination.name(), false);
                    continue;
                }
            };

            match upstream.send(payload).await {
                Ok(_) => {
                    sent += 1;
                    metrics::record_forward(destination.name(), true);
                }
                Err(e) => {
                    tracing::warn!(from = %client, destination = %destination, error = %e, "Forward failed");
                    metrics::record_forward(destination.name(), false);
                }
            }
        }

        tracing::trace!(from = %client, generation = snapshot.generation, sent, "Datagram fanned out");
        sent
    }

    /// Close every live session. The inbound socket is released with the engine.
    pub async fn close(&self) {
        let closed = self.sessions.close_all().await;
        tracing::info!(sessions = closed.len(), "Relay engine closed");
    }

    fn spawn_reader(&self, key: SessionKey, upstream: Arc<UdpSocket>) -> JoinHandle<()> {
        tokio::spawn(relay_replies(
            key,
            upstream,
            self.socket.clone(),
            self.sessions.clone(),
            self.idle_timeout,
        ))
    }
}

/// Reply loop of one session: everything read from the upstream socket goes
/// back to the session's client.
async fn relay_replies(
    key: SessionKey,
    upstream: Arc<UdpSocket>,
    inbound: Arc<UdpSocket>,
    sessions: Arc<SessionTracker>,
    idle_timeout: Duration,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let len = match time::timeout(idle_timeout, upstream.recv(&mut buf)).await {
            // Read deadline only; eviction belongs to the sweep.
            Err(_) => continue,
            Ok(Ok(len)) => len,
            Ok(Err(e)) => {
                tracing::debug!(session = %key, error = %e, "Upstream receive failed");
                continue;
            }
        };

        if !sessions.touch(&key).await {
            break;
        }

        match inbound.send_to(&buf[..len], key.client).await {
            Ok(_) => metrics::record_reply(&key.destination),
            Err(e) => {
                tracing::warn!(session = %key, error = %e, "Reply to client failed");
            }
        }
    }
}
