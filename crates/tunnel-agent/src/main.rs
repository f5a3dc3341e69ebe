//! Tunnel agent
//!
//! Reference host for the tunnel lifecycle bridge. Replays backend events
//! read from stdin (one JSON event per line), waits for the tunnel to start
//! and prints every published state as a JSON line on stdout.

mod host;

use anyhow::{Context, Result};
use host::{LoggingProvider, spawn_stdin_reader};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tunnel_lifecycle::{BridgeConfig, EventBridge, LogNotifier, TunStatus, TunnelProvider};

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn load_config() -> Result<BridgeConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => BridgeConfig::load(&path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

fn init_logging(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // stdout carries the state stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config);

    info!("tunnel-agent starting...");

    let provider = Arc::new(LoggingProvider::default());
    let weak_provider: Weak<dyn TunnelProvider> = Arc::<LoggingProvider>::downgrade(&provider);

    let mut bridge = EventBridge::spawn(config, weak_provider, Arc::new(LogNotifier))
        .context("starting event bridge")?;
    if !provider.observes_path() {
        warn!("Provider is not observing the default path");
    }

    let mut states = bridge.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            match serde_json::to_string(&state) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode state: {}", e),
            }
        }
    });

    let (eof_tx, eof_rx) = oneshot::channel();
    let _reader = spawn_stdin_reader(bridge.sender(), bridge.fatal_error_flag(), eof_tx)
        .context("spawning stdin reader")?;

    let start_timeout = bridge.config().start_timeout();
    match bridge.wait_until_started_within(start_timeout).await {
        Ok(state) => info!("Tunnel start settled: {} ({:?})", state, TunStatus::from(&state)),
        Err(e) => warn!("Tunnel start failed: {}", e),
    }

    let _ = eof_rx.await;
    bridge.shutdown();
    printer.await.context("joining state printer")?;

    info!("tunnel-agent shutting down");
    Ok(())
}
