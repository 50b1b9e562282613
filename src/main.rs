//! ws-reactor server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                        WS REACTOR                        │
//!                 │                                                          │
//!  TCP clients    │  ┌──────────┐  Handoff  ┌─────────────┐                  │
//!  ───────────────┼─▶│ acceptor │──────────▶│ multiplexer │  (mio Poll)      │
//!                 │  │  thread  │ SegQueue  │   thread    │                  │
//!                 │  └──────────┘           └──────┬──────┘                  │
//!                 │                                │ sessions:              │
//!                 │                                │ reader → codec →       │
//!                 │                                │ control replies        │
//!                 │                                ▼                        │
//!                 │                        ┌──────────────┐                 │
//!                 │                        │ worker pool  │ → MessageHandler│
//!                 │                        │ (N threads)  │                 │
//!                 │                        └──────┬───────┘                 │
//!                 │                               │ queue_message           │
//!  ◀──────────────┼───────── writer ◀─────────────┘                         │
//!                 └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The demo handler echoes every text and binary message back to its sender.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use ws_reactor::config::{load_config, ServerConfig};
use ws_reactor::lifecycle::signals::wait_for_shutdown_signal;
use ws_reactor::observability::{logging, metrics};
use ws_reactor::{BoxError, InboundMessage, MessageHandler, WsServer};

#[derive(Parser)]
#[command(name = "ws-reactor")]
#[command(about = "Non-blocking WebSocket echo server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `dispatch.workers`.
    #[arg(short, long)]
    workers: Option<usize>,
}

/// Echoes data messages and counts them per session.
struct EchoHandler;

impl MessageHandler<InboundMessage> for EchoHandler {
    fn handle(&self, task: &InboundMessage) -> Result<(), BoxError> {
        let session = &task.session;
        let count = session.get::<u64>("echoed").map_or(1, |n| *n + 1);
        session.set("echoed", count);

        tracing::debug!(
            session_id = %session.id(),
            remote = %session.remote_address(),
            count,
            message = %task.message,
            "Echoing message"
        );
        session.queue_message(&task.message)?;
        Ok(())
    }

    fn on_reject(&self, task: InboundMessage) {
        tracing::warn!(session_id = %task.session.id(), "Dispatch queue full, message dropped");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(workers) = cli.workers {
        config.dispatch.workers = workers;
    }
    ws_reactor::config::validate_config(&config).map_err(ws_reactor::config::ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("ws-reactor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        workers = config.dispatch.workers,
        max_packet_size = config.session.max_packet_size,
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

    let server = WsServer::new(config, Arc::new(EchoHandler));
    let addr = server.start()?;
    tracing::info!(address = %addr, "Listening for connections");

    let signal = wait_for_shutdown_signal().await;
    tracing::info!(signal, "Shutdown signal received");

    tokio::task::spawn_blocking(move || server.stop()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
