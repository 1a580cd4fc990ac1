//! # courier
//!
//! Relay server binary: loads settings, installs logging and the metrics
//! recorder, then serves the WebSocket relay until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use courier_server::{CourierServer, ServerConfig};
use courier_settings::{load_settings, CourierSettings};
use courier_telemetry::{init_telemetry, TelemetryConfig};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity-addressed WebSocket message relay.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Identity-addressed WebSocket message relay")]
struct Cli {
    /// JSON settings file. Missing files fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut CourierSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);

    let telemetry = TelemetryConfig::from_settings(&settings.logging).context("Invalid logging settings")?;
    init_telemetry(&telemetry).context("Failed to initialize logging")?;

    let metrics = courier_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let server = CourierServer::new(ServerConfig::from(&settings.server), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Courier relay listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        connections = server.registry().connection_count(),
        "Shutting down..."
    );
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_TIMEOUT))
        .await;
    Ok(())
}
