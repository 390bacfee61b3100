//! Liveness probes.
//!
//! # Responsibilities
//! - Define the probe seam used by the health checker
//! - DNS probe: one A-record query per destination, healthy on a
//!   substantive answer
//!
//! # Design Decisions
//! - Probes do not bound their own duration; the checker applies the timeout
//! - Replies with a foreign query id are ignored, not treated as failures

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::destination::Destination;

const HEADER_LEN: usize = 12;
const FLAG_QR: u16 = 0x8000;
const FLAG_RD: u16 = 0x0100;
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("address resolved to nothing")]
    NoAddress,
    #[error("invalid probe domain {0:?}")]
    InvalidDomain(String),
    #[error("malformed reply: {0}")]
    Malformed(&'static str),
    #[error("server answered with rcode {0}")]
    Rcode(u8),
    #[error("reply carried no answer records")]
    EmptyAnswer,
}

/// A liveness check against one destination.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, destination: &Destination) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// A-record query for a fixed domain.
#[derive(Debug, Clone)]
pub struct DnsProbe {
    domain: String,
}

impl DnsProbe {
    pub fn new(domain: impl Into<String>) -> Result<Self, ProbeError> {
        let domain = domain.into();
        encode_name(&domain, &mut Vec::new())?;
        Ok(Self { domain })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Probe for DnsProbe {
    async fn probe(&self, destination: &Destination) -> Result<(), ProbeError> {
        tracing::debug!(destination = %destination, domain = %self.domain, "Checking DNS");

        let remote = tokio::net::lookup_host(destination.address())
            .await?
            .next()
            .ok_or(ProbeError::NoAddress)?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;

        let id = fastrand::u16(..);
        socket.send(&build_query(id, &self.domain)?).await?;

        let mut buf = [0u8; 1500];
        loop {
            let len = socket.recv(&mut buf).await?;
            match check_reply(id, &buf[..len]) {
                Err(ProbeError::Malformed("id mismatch")) => continue,
                other => return other,
            }
        }
    }
}

fn encode_name(domain: &str, out: &mut Vec<u8>) -> Result<(), ProbeError> {
    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    if trimmed.is_empty() || trimmed.len() > 253 {
        return Err(ProbeError::InvalidDomain(domain.to_string()));
    }
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > 63 || !label.is_ascii() {
            return Err(ProbeError::InvalidDomain(domain.to_string()));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(())
}

/// Standard recursive A query with a single question.
pub fn build_query(id: u16, domain: &str) -> Result<Vec<u8>, ProbeError> {
    let mut msg = Vec::with_capacity(HEADER_LEN + domain.len() + 6);
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&FLAG_RD.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    msg.extend_from_slice(&[0; 6]); // an, ns, ar
    encode_name(domain, &mut msg)?;
    msg.extend_from_slice(&TYPE_A.to_be_bytes());
    msg.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(msg)
}

/// Healthy iff the reply answers our query, reports NOERROR and has answers.
pub fn check_reply(id: u16, reply: &[u8]) -> Result<(), ProbeError> {
    if reply.len() < HEADER_LEN {
        return Err(ProbeError::Malformed("short header"));
    }
    let word = |i: usize| u16::from_be_bytes([reply[i], reply[i + 1]]);

    if word(0) != id {
        return Err(ProbeError::Malformed("id mismatch"));
    }
    let flags = word(2);
    if flags & FLAG_QR == 0 {
        return Err(ProbeError::Malformed("not a response"));
    }
    let rcode = (flags & 0x000f) as u8;
    if rcode != 0 {
        return Err(ProbeError::Rcode(rcode));
    }
    if word(6) == 0 {
        return Err(ProbeError::EmptyAnswer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Turn a query into a response with `answers` answer records.
    fn answer(query: &[u8], rcode: u8, answers: u16) -> Vec<u8> {
        let mut reply = query.to_vec();
        let flags = FLAG_QR | FLAG_RD | 0x0080 | rcode as u16;
        reply[2..4].copy_from_slice(&flags.to_be_bytes());
        reply[6..8].copy_from_slice(&answers.to_be_bytes());
        for _ in 0..answers {
            // pointer to the question name, A IN, ttl 60, 127.0.0.1
            reply.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 127, 0, 0, 1]);
        }
        reply
    }

    #[test]
    fn query_layout() {
        let q = build_query(0xabcd, "example.com.").unwrap();
        assert_eq!(&q[..12], &[0xab, 0xcd, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&q[12..25], b"\x07example\x03com\x00");
        assert_eq!(&q[25..], &[0, 1, 0, 1]);
        assert_eq!(build_query(1, "example.com").unwrap()[2..], q[2..]);
    }

    #[test]
    fn rejects_bad_domains() {
        let long = "x".repeat(64);
        for bad in ["", ".", "a..b", long.as_str()] {
            assert!(matches!(DnsProbe::new(bad), Err(ProbeError::InvalidDomain(_))), "{bad:?}");
        }
        assert!(DnsProbe::new("google.com.").is_ok());
    }

    #[test]
    fn reply_classification() {
        let q = build_query(7, "example.com").unwrap();
        assert!(check_reply(7, &answer(&q, 0, 1)).is_ok());
        assert!(matches!(check_reply(7, &answer(&q, 0, 0)), Err(ProbeError::EmptyAnswer)));
        assert!(matches!(check_reply(7, &answer(&q, 3, 0)), Err(ProbeError::Rcode(3))));
        assert!(matches!(check_reply(8, &answer(&q, 0, 1)), Err(ProbeError::Malformed("id mismatch"))));
        assert!(matches!(check_reply(7, &q), Err(ProbeError::Malformed("not a response"))));
        assert!(matches!(check_reply(7, &q[..5]), Err(ProbeError::Malformed("short header"))));
    }

    #[tokio::test]
    async fn probes_a_live_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&answer(&buf[..len], 0, 1), from).await.unwrap();
        });

        let probe = DnsProbe::new("example.com.").unwrap();
        let destination = Destination::new("local", addr.to_string()).unwrap();
        probe.probe(&destination).await.unwrap();
    }
}
