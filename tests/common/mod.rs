//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use fanout_relay::RelayConfig;

/// A loopback UDP destination.
///
/// Payloads shorter than a DNS header are recorded and echoed back prefixed
/// with the destination name. Anything shaped like a DNS query is answered
/// as a health probe: one A record while healthy, SERVFAIL otherwise.
pub struct MockDestination {
    pub name: String,
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
    received: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockDestination {
    pub async fn start(name: &str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let healthy = Arc::new(AtomicBool::new(true));
        let (tx, received) = mpsc::unbounded_channel();

        let prefix = format!("{name}:");
        let health = healthy.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let datagram = &buf[..len];
                if len >= 12 {
                    let reply = dns_reply(datagram, health.load(Ordering::SeqCst));
                    let _ = socket.send_to(&reply, from).await;
                    continue;
                }
                if tx.send(datagram.to_vec()).is_err() {
                    break;
                }
                let mut echo = prefix.clone().into_bytes();
                echo.extend_from_slice(datagram);
                let _ = socket.send_to(&echo, from).await;
            }
        });

        Self {
            name: name.to_string(),
            addr,
            healthy,
            received,
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Next relayed payload, if one arrives within `wait`.
    pub async fn recv_within(&mut self, wait: Duration) -> Option<Vec<u8>> {
        time::timeout(wait, self.received.recv()).await.ok().flatten()
    }
}

fn dns_reply(query: &[u8], healthy: bool) -> Vec<u8> {
    let mut reply = query.to_vec();
    if healthy {
        reply[2] = 0x81;
        reply[3] = 0x80;
        reply[6..8].copy_from_slice(&1u16.to_be_bytes());
        reply.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 127, 0, 0, 1]);
    } else {
        reply[2] = 0x81;
        reply[3] = 0x82;
    }
    reply
}

/// Relay config bound to an ephemeral loopback port.
pub fn loopback_config(destinations: &[&MockDestination]) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.forward.bind_ip = "127.0.0.1".parse().unwrap();
    config.forward.port = 0;
    config.forward.static_destinations = destinations
        .iter()
        .map(|d| fanout_relay::destination::DestinationEntry::new(d.name.as_str(), d.addr.to_string()))
        .collect();
    config
}

pub async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// Collect every datagram the client receives within `wait`.
pub async fn drain_replies(client: &UdpSocket, wait: Duration) -> Vec<String> {
    let deadline = Instant::now() + wait;
    let mut replies = Vec::new();
    let mut buf = [0u8; 2048];
    while let Ok(Ok((len, _))) = time::timeout_at(deadline, client.recv_from(&mut buf)).await {
        replies.push(String::from_utf8_lossy(&buf[..len]).into_owned());
    }
    replies.sort();
    replies
}

/// Poll `condition` every 10ms until it holds or `limit` elapses.
pub async fn eventually<F: FnMut() -> bool>(limit: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
