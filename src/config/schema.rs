//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::destination::DestinationEntry;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Inbound socket, idle timeout and static destinations.
    pub forward: ForwardConfig,

    /// Admin push API.
    pub admin: AdminConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Address the inbound socket binds to.
    pub bind_ip: IpAddr,

    /// Inbound UDP port (0 picks an ephemeral port).
    pub port: u16,

    /// Session idle timeout in milliseconds.
    pub idle_timeout_ms: u64,

    /// Destinations committed at startup and on config reload.
    #[serde(rename = "static")]
    pub static_destinations: Vec<DestinationEntry>,
}

impl ForwardConfig {
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5300,
            idle_timeout_ms: 30_000,
            static_destinations: Vec::new(),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Interval between checks in milliseconds; 0 disables checking.
    pub period_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Domain queried (A record) against each destination.
    pub domain: String,
}

impl HealthCheckConfig {
    pub fn enabled(&self) -> bool {
        self.period_ms > 0
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            period_ms: 0,
            timeout_ms: 15_000,
            domain: "google.com.".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Shared secret expected in the Authorization header.
    pub token: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
