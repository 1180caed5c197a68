//! # switchboard
//!
//! Broker binary: loads settings, starts the frame gateway and runs until
//! Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_broker::{BrokerConfig, MessageBroker};
use switchboard_core::logging::init_subscriber;
use switchboard_server::SwitchboardServer;
use switchboard_server::metrics::install_recorder;
use switchboard_settings::{SwitchboardSettings, load_settings_from_path, settings_path};

/// Cross-context message broker with a `WebSocket` frame gateway.
#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Cross-context message broker")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.switchboard/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer the command-line flags over loaded settings.
    fn apply(&self, settings: &mut SwitchboardSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load(cli: &Cli) -> Result<SwitchboardSettings> {
    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = install_recorder().context("Failed to install metrics recorder")?;
    let broker = Arc::new(MessageBroker::new(BrokerConfig::from(&settings.broker)));
    tracing::info!(
        accepted_origins = ?broker.accepted_origins(),
        request_timeout_ms = ?settings.broker.request_timeout_ms,
        "broker ready"
    );

    let server = SwitchboardServer::new(settings.server, broker, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("switchboard listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server.shutdown().graceful_shutdown(vec![handle], None).await;
    tracing::info!(
        abandoned_requests = report.abandoned_requests,
        remaining_frames = report.remaining_frames,
        "Shutdown complete"
    );
    Ok(())
}
