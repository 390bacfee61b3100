//! Session tracking for reply routing.
//!
//! # Responsibilities
//! - One session per (client, destination name), created on first packet
//! - Own the upstream socket and its reply reader for the session's lifetime
//! - Evict idle sessions and notify the observer exactly once per eviction
//!
//! # Design Decisions
//! - A single async mutex guards the table; creation, touch and sweep all go
//!   through it, so a sweep can never race a creation for the same pair
//! - Socket bind/connect happens outside the lock, the insert re-checks
//! - Addresses arrive resolved; no name lookup happens here
//! - Observer callbacks run after the lock is released

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::destination::Destination;
use crate::observability::metrics;
use crate::relay::observer::ConnectionObserver;
use crate::relay::RelayError;

/// Identity of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub client: SocketAddr,
    pub destination: String,
}

impl SessionKey {
    pub fn new(client: SocketAddr, destination: impl Into<String>) -> Self {
        Self {
            client,
            destination: destination.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.client, self.destination)
    }
}

/// A live client/destination association.
#[derive(Debug)]
pub struct Session {
    destination: Destination,
    socket: Arc<UdpSocket>,
    reader: Option<JoinHandle<()>>,
    last_activity: Instant,
    datagrams_sent: u64,
    datagrams_received: u64,
}

impl Session {
    fn new(destination: Destination, socket: Arc<UdpSocket>) -> Self {
        Self {
            destination,
            socket,
            reader: None,
            last_activity: Instant::now(),
            datagrams_sent: 0,
            datagrams_received: 0,
        }
    }

    fn is_idle_at(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }
}

impl Drop for Session {
    // The reader holds the other socket handle; stopping it closes the socket.
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Point-in-time counters for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub total_created: u64,
    pub total_evicted: u64,
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
}

/// Table of live sessions.
pub struct SessionTracker {
    sessions: Mutex<HashMap<SessionKey, Session>>,
    observer: Arc<dyn ConnectionObserver>,
    total_created: AtomicU64,
    total_evicted: AtomicU64,
}

impl SessionTracker {
    pub fn new(observer: Arc<dyn ConnectionObserver>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            observer,
            total_created: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
        }
    }

    /// Return the upstream socket of the session for `(client, destination)`,
    /// opening one connected to the already resolved `remote` if needed.
    /// Records activity either way.
    ///
    /// `spawn_reader` is called once per created session, under the table
    /// lock, and must start the reply loop for the new socket.
    pub async fn get_or_create<F>(
        &self,
        client: SocketAddr,
        destination: &Destination,
        remote: SocketAddr,
        spawn_reader: F,
    ) -> Result<Arc<UdpSocket>, RelayError>
    where
        F: FnOnce(SessionKey, Arc<UdpSocket>) -> JoinHandle<()>,
    {
        let key = SessionKey::new(client, destination.name());

        let replaced = {
            let mut sessions = self.sessions.lock().await;
            if let Some(socket) = reuse(&mut sessions, &key, destination) {
                return Ok(socket);
            }
            // Same name, new address: the old session goes away.
            sessions.remove(&key)
        };
        if let Some(old) = replaced {
            self.total_evicted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session = %key, old = %old.destination, new = %destination, "Destination re-pointed, replacing session");
            drop(old);
            self.notify_disconnect(&key);
        }

        let socket = Arc::new(open_upstream(destination, remote).await?);

        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = reuse(&mut sessions, &key, destination) {
            return Ok(existing);
        }

        let mut session = Session::new(destination.clone(), socket.clone());
        session.datagrams_sent = 1;
        session.reader = Some(spawn_reader(key.clone(), socket.clone()));
        if let Some(stale) = sessions.insert(key.clone(), session) {
            self.total_evicted.fetch_add(1, Ordering::Relaxed);
            drop(stale);
            self.notify_disconnect(&key);
        }
        let active = sessions.len();
        drop(sessions);

        self.total_created.fetch_add(1, Ordering::Relaxed);
        metrics::set_active_sessions(active);
        self.notify_connect(&key);
        Ok(socket)
    }

    /// Record reply traffic. Returns false when the session no longer exists.
    pub async fn touch(&self, key: &SessionKey) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(key) {
            Some(session) => {
                session.last_activity = Instant::now();
                session.datagrams_received += 1;
                true
            }
            None => false,
        }
    }

    /// Evict every session idle for longer than `idle_timeout` as of `now`.
    pub async fn sweep(&self, now: Instant, idle_timeout: Duration) -> Vec<SessionKey> {
        let (evicted, active) = {
            let mut sessions = self.sessions.lock().await;
            let idle: Vec<SessionKey> = sessions
                .iter()
                .filter(|(_, s)| s.is_idle_at(now, idle_timeout))
                .map(|(k, _)| k.clone())
                .collect();
            let evicted: Vec<(SessionKey, Session)> = idle
                .into_iter()
                .filter_map(|k| sessions.remove(&k).map(|s| (k, s)))
                .collect();
            (evicted, sessions.len())
        };

        if evicted.is_empty() {
            return Vec::new();
        }
        metrics::set_active_sessions(active);
        tracing::debug!(evicted = evicted.len(), remaining = active, "Idle sessions swept");
        self.finish_evictions(evicted)
    }

    /// Evict everything (shutdown).
    pub async fn close_all(&self) -> Vec<SessionKey> {
        let evicted: Vec<(SessionKey, Session)> = self.sessions.lock().await.drain().collect();
        metrics::set_active_sessions(0);
        self.finish_evictions(evicted)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, client: SocketAddr, destination: &str) -> bool {
        self.sessions
            .lock()
            .await
            .contains_key(&SessionKey::new(client, destination))
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.lock().await;
        SessionStats {
            active_sessions: sessions.len(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            datagrams_sent: sessions.values().map(|s| s.datagrams_sent).sum(),
            datagrams_received: sessions.values().map(|s| s.datagrams_received).sum(),
        }
    }

    fn finish_evictions(&self, evicted: Vec<(SessionKey, Session)>) -> Vec<SessionKey> {
        self.total_evicted.fetch_add(evicted.len() as u64, Ordering::Relaxed);
        evicted
            .into_iter()
            .map(|(key, session)| {
                drop(session);
                self.notify_disconnect(&key);
                key
            })
            .collect()
    }

    fn notify_connect(&self, key: &SessionKey) {
        let observer = &self.observer;
        if catch_unwind(AssertUnwindSafe(|| observer.on_connect(key.client, &key.destination))).is_err() {
            tracing::warn!(session = %key, "Connect observer panicked");
        }
    }

    fn notify_disconnect(&self, key: &SessionKey) {
        let observer = &self.observer;
        if catch_unwind(AssertUnwindSafe(|| observer.on_disconnect(key.client, &key.destination))).is_err() {
            tracing::warn!(session = %key, "Disconnect observer panicked");
        }
    }
}

fn reuse(
    sessions: &mut HashMap<SessionKey, Session>,
    key: &SessionKey,
    destination: &Destination,
) -> Option<Arc<UdpSocket>> {
    let session = sessions.get_mut(key).filter(|s| s.destination == *destination)?;
    session.last_activity = Instant::now();
    session.datagrams_sent += 1;
    Some(session.socket.clone())
}

/// Open a socket of the matching family connected to `remote`.
async fn open_upstream(destination: &Destination, remote: SocketAddr) -> Result<UdpSocket, RelayError> {
    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local)
        .await
        .map_err(|source| RelayError::SessionSocket {
            destination: destination.to_string(),
            source,
        })?;
    socket
        .connect(remote)
        .await
        .map_err(|source| RelayError::SessionSocket {
            destination: destination.to_string(),
            source,
        })?;
    Ok(socket)
}
