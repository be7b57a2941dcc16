//! GCE Metadata Concealment Proxy
//!
//! Sits between workloads and the metadata server, hiding sensitive
//! endpoints and refusing anything it does not recognize.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │               METADATA PROXY                 │
//!                    │                                              │
//!   Client Request   │  ┌─────────┐   ┌─────────┐   ┌──────────┐    │
//!   ─────────────────┼─▶│   net   │──▶│  http   │──▶│  policy  │    │
//!                    │  │listener │   │ server  │   │  engine  │    │
//!                    │  └─────────┘   └─────────┘   └────┬─────┘    │
//!                    │                      ▲     blocked│ proxied  │
//!                    │                      │       ┌────┴─────┐    │
//!   Client Response  │                 ┌────┴────┐  │ upstream │    │
//!   ◀────────────────┼─────────────────│response │◀─│forwarder │◀───┼── 169.254.169.254
//!                    │                 │finalizer│  │ + buffers│    │
//!                    │                 └─────────┘  └──────────┘    │
//!                    │                                              │
//!                    │  config · observability · lifecycle          │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use metadata_proxy::config::{load_config, validate_config, ProxyConfig};
use metadata_proxy::lifecycle::{self, signals, Shutdown};
use metadata_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "metadata-proxy")]
#[command(about = "Proxy that conceals sensitive GCE metadata endpoints", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration.
    #[arg(long)]
    addr: Option<String>,

    /// Address for the metrics endpoint, overriding the configuration.
    #[arg(long)]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(addr) = args.addr {
        config.listener.bind_address = addr;
    }
    if let Some(addr) = args.metrics_addr {
        config.observability.metrics_address = addr;
    }
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        return Err("invalid configuration".into());
    }

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        max_connections = config.listener.max_connections,
        "metadata-proxy starting"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
            return Err(e.into());
        }
    }

    let (server, listener) =
        lifecycle::prepare(config, Arc::new(metrics::PrometheusRecorder)).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
