//! Gatekeeper (v1)
//!
//! A request-integrity and abuse-control gateway built with Tokio and
//! Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────┐
//!                   │                  GATEWAY                     │
//!                   │                                              │
//!   Client Request  │  ┌────────┐   ┌───────────┐   ┌───────────┐ │
//!   ────────────────┼─▶│ tenant │──▶│ ratelimit │──▶│  signing  │─┼──▶ handler
//!                   │  │ chain  │   │  limiter  │   │  verify   │ │
//!                   │  └────────┘   └─────┬─────┘   └─────┬─────┘ │
//!                   │       │             │               │       │
//!                   │      400           429             401      │
//!                   │                                              │
//!                   │  ┌────────────────────────────────────────┐ │
//!                   │  │          Cross-Cutting Concerns        │ │
//!                   │  │  config (hot reload) · observability   │ │
//!                   │  │  counter/nonce stores (local | redis)  │ │
//!                   │  └────────────────────────────────────────┘ │
//!                   └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use gatekeeper::config::loader::load_config;
use gatekeeper::config::schema::GatewayConfig;
use gatekeeper::config::watcher::ConfigWatcher;
use gatekeeper::http::HttpServer;
use gatekeeper::lifecycle::Shutdown;
use gatekeeper::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", about = "Request-integrity and abuse-control gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("gatekeeper v0.1.0 starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_enabled = config.rate_limit.enabled,
        signing_required = config.signing.required,
        tenant_required = config.tenant.required,
        redis = config.redis.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // hot reload when running from a config file
    let (config_updates_tx, config_updates) = mpsc::unbounded_channel();
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut rx) = ConfigWatcher::new(path);
            tokio::spawn(async move {
                while let Some(new_config) = rx.recv().await {
                    let _ = config_updates_tx.send(new_config);
                }
            });
            Some(watcher.run()?)
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::build(config).await?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
