//! UDP Fan-out Relay
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                  FAN-OUT RELAY                    │
//!                  │                                                   │
//!   Client         │  ┌──────────┐   snapshot   ┌──────────────┐       │
//!   datagram ──────┼─▶│  relay   │◀─────────────│ destination  │       │
//!                  │  │  engine  │              │   registry   │       │
//!                  │  └────┬─────┘              └──────▲───────┘       │
//!                  │       │ one session per           │ commit        │
//!                  │       │ (client, destination)     │               │
//!                  │       ▼                    ┌──────┴───────┐       │
//!                  │  ┌──────────┐              │  reconcile   │       │
//!   Replies  ◀─────┼──│ sessions │──────────────┼▶ controller  │       │
//!                  │  └──────────┘  ──── Dest A └──────▲───────┘       │
//!                  │                ──── Dest B        │ proposals     │
//!                  │                ──── Dest C   ┌────┴─────┬──────┐  │
//!                  │                              │ config   │admin │  │
//!                  │                              │ + health │ API  │  │
//!                  │                              └──────────┴──────┘  │
//!                  └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use fanout_relay::config::loader::load_config_or_default;
use fanout_relay::lifecycle::signals::wait_for_signal;
use fanout_relay::observability::{logging, metrics};
use fanout_relay::{Relay, Shutdown};

#[derive(Parser)]
#[command(name = "fanout-relay")]
#[command(about = "UDP relay that copies every datagram to a managed set of destinations", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config_or_default(&args.config)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fanout-relay starting");
    tracing::info!(
        bind_address = %config.forward.bind_address(),
        static_destinations = config.forward.static_destinations.len(),
        idle_timeout_ms = config.forward.idle_timeout_ms,
        health_check_period_ms = config.health_check.period_ms,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let relay = match Relay::bind(config).await {
        Ok(relay) => relay.watch_config(&args.config),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }

    relay.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
