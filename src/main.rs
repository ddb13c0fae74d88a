//! presence-feed - live presence analytics feed daemon
//!
//! Connects to the backend sensor stream, keeps the feed state warm through
//! disconnects (backoff reconnection, synthetic fallback) and exposes it to
//! the consuming layer.
//!
//! Module structure:
//! - `domain/` - Core types (snapshots, tracks, alerts, connection state)
//! - `io/` - External interfaces (WebSocket transport, stream client, feed channel)
//! - `services/` - Business logic (feed store, alerts, synthetic simulation)
//! - `infra/` - Infrastructure (config)

use clap::Parser;
use presence_feed::infra::Config;
use presence_feed::services::FeedStore;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// presence-feed - presence analytics feed daemon
#[derive(Parser, Debug)]
#[command(name = "presence-feed", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Override the stream endpoint from the config file
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = env!("GIT_HASH"), "presence-feed starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    let stream_url = args.url.as_deref().unwrap_or_else(|| config.stream_url());

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        stream_url = %stream_url,
        status_interval_secs = %config.status_interval_secs(),
        "config_loaded"
    );

    let store = FeedStore::new();
    store.init_connection(stream_url);

    let mut status = tokio::time::interval(std::time::Duration::from_secs(
        config.status_interval_secs(),
    ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = status.tick() => {
                let snapshot = store.snapshot();
                info!(
                    state = %store.connection_state(),
                    demo = store.is_demo_mode(),
                    occupancy = snapshot.as_ref().map(|s| s.current).unwrap_or(0),
                    entries = snapshot.as_ref().map(|s| s.entries).unwrap_or(0),
                    exits = snapshot.as_ref().map(|s| s.exits).unwrap_or(0),
                    history = store.history_len(),
                    alerts = store.alerts().len(),
                    "feed_status"
                );
            }
            _ = &mut shutdown => {
                info!("shutdown_signal_received");
                break;
            }
        }
    }

    store.disconnect();
    info!("presence-feed shutdown complete");
    Ok(())
}
