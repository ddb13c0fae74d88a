//! Mock presence backend
//!
//! Simulates the backend sensor pipeline for local end-to-end runs: serves
//! the stream wire contract over WebSocket, feeding each client plausible
//! data from the same crowd simulation the demo mode uses.
//!
//! Protocol (one JSON envelope per text frame):
//! - server -> client: `{"type":"global","data":{...}}`, `{"type":"tracks","data":[...]}`
//! - client -> server: `{"type":"ping"}`, answered with `{"type":"pong"}`
//!
//! Behavior:
//! 1. Listens on a configurable port (default 9310)
//! 2. Emits a global/tracks pair per tick to every connected client
//! 3. Optionally drops each client after a fixed interval (--flap-secs) to
//!    exercise the reconnect path
//!
//! Usage:
//!   cargo run --bin mock-backend -- --port 9310 --tick-ms 1000 --flap-secs 45

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use presence_feed::io::transport::{encode_global, encode_pong, encode_tracks};
use presence_feed::services::{Simulation, ThreadRandom};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "mock-backend")]
#[command(about = "Mock presence backend for local simulation")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "9310")]
    port: u16,

    /// Emission tick interval (ms)
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Drop each client after this many seconds (0 = never)
    #[arg(long, default_value = "0")]
    flap_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(port = args.port, tick_ms = args.tick_ms, flap_secs = args.flap_secs, "mock_backend_listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let client_args = args.clone();
        tokio::spawn(async move {
            info!(peer = %peer, "client_connected");
            if let Err(e) = serve_client(stream, client_args).await {
                warn!(peer = %peer, error = %e, "client_error");
            }
            info!(peer = %peer, "client_gone");
        });
    }
}

async fn serve_client(stream: TcpStream, args: Args) -> anyhow::Result<()> {
    let mut ws = accept_async(stream).await?;

    let tick = Duration::from_millis(args.tick_ms);
    let mut sim = Simulation::new(Box::new(ThreadRandom), tick);
    sim.seed_initial_crowd();

    let mut ticker = tokio::time::interval(tick);
    let flap_at = if args.flap_secs > 0 {
        Some(tokio::time::Instant::now() + Duration::from_secs(args.flap_secs))
    } else {
        None
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (snapshot, tracks) = sim.tick();
                ws.send(Message::text(encode_global(&snapshot))).await?;
                ws.send(Message::text(encode_tracks(&tracks))).await?;
            }
            _ = async {
                match flap_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                // Simulated outage: drop the client without a close handshake
                info!("flapping_client");
                return Ok(());
            }
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let is_ping = serde_json::from_str::<serde_json::Value>(text.as_str())
                        .ok()
                        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(String::from)))
                        .is_some_and(|kind| kind == "ping");
                    if is_ping {
                        ws.send(Message::text(encode_pong())).await?;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}
