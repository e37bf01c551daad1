//! banter server binary.
//!
//! # Usage
//!
//! ```bash
//! # All defaults: listen on 0.0.0.0:8080, in-memory everything
//! banter-server
//!
//! # With a config file
//! banter-server --config banter.json
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use banter_hub::{Hub, MemoryStore};
use banter_proto::{OpenAccess, Proto, RoomDirectory, UserDirectory};
use banter_server::{AppState, ServerConfig, SessionRegistry, router};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// banter chat server
#[derive(Parser, Debug)]
#[command(name = "banter-server")]
#[command(about = "Real-time multi-user chat server")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    tracing::info!("banter server starting");

    let hub = Hub::new(MemoryStore::new());
    hub.set_senders(config.hub.senders);
    hub.set_flush_delay(Duration::from_secs(config.hub.flush_delay_secs)).await;
    hub.set_flush_items(config.hub.flush_items).await;
    hub.set_flush_threshold(config.hub.flush_threshold).await;
    hub.start().await;

    let users = UserDirectory::new();
    let sessions = SessionRegistry::new(Duration::from_secs(config.session.ttl_secs));
    let service =
        Arc::new(Proto::new(hub.clone(), users.clone(), RoomDirectory::new(), OpenAccess));

    let state = AppState::new(&config, service, sessions, users);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("shutting down");
    hub.stop().await;
    tracing::info!("bye");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("cannot listen for the interrupt signal");
        return;
    }
    tracing::info!("interrupt received");
}
