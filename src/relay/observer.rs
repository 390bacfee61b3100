//! Session lifecycle notifications.

use std::net::SocketAddr;

/// Observer of session creation and eviction.
///
/// Invoked synchronously on the relay path, so implementations must return
/// quickly and push any real work onto a queue. They cannot fail the relay.
pub trait ConnectionObserver: Send + Sync {
    fn on_connect(&self, client: SocketAddr, destination: &str);
    fn on_disconnect(&self, client: SocketAddr, destination: &str);
}

/// Default observer: debug-level log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ConnectionObserver for LoggingObserver {
    fn on_connect(&self, client: SocketAddr, destination: &str) {
        tracing::debug!(from = %client, destination, "connected");
    }

    fn on_disconnect(&self, client: SocketAddr, destination: &str) {
        tracing::debug!(from = %client, destination, "disconnected");
    }
}
