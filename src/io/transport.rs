//! Transport abstraction over the backend stream socket
//!
//! The backend speaks a message-framed JSON protocol over a persistent
//! WebSocket: one envelope per text frame, `{"type": ..., "data": ...}`.
//! Inbound envelope types are `global`, `tracks` and `pong`; the client
//! sends `ping` as its heartbeat. Unknown envelope types are skipped for
//! forward compatibility.
//!
//! `Transport`/`Connection` are trait seams so the stream client's state
//! machine can be driven by a scripted in-memory transport under a paused
//! clock in tests.

use crate::domain::types::{GlobalSnapshot, TrackSnapshot};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

/// Messages the client sends upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Heartbeat probe; the backend answers with a `pong` envelope
    Ping,
}

impl ClientMessage {
    pub fn to_text(self) -> String {
        match self {
            ClientMessage::Ping => json!({"type": "ping"}).to_string(),
        }
    }
}

/// Decoded inbound envelope
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Global(GlobalSnapshot),
    Tracks(Vec<TrackSnapshot>),
    Pong,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse one inbound text frame
///
/// Returns `Ok(None)` for unknown envelope types (skipped); a malformed
/// envelope or payload is a protocol error and surfaces as `Err`.
pub fn parse_server_event(text: &str) -> anyhow::Result<Option<ServerEvent>> {
    let envelope: Envelope =
        serde_json::from_str(text).context("invalid stream envelope")?;

    match envelope.kind.as_str() {
        "global" => {
            let snapshot: GlobalSnapshot =
                serde_json::from_value(envelope.data).context("malformed global payload")?;
            Ok(Some(ServerEvent::Global(snapshot)))
        }
        "tracks" => {
            let tracks: Vec<TrackSnapshot> =
                serde_json::from_value(envelope.data).context("malformed tracks payload")?;
            Ok(Some(ServerEvent::Tracks(tracks)))
        }
        "pong" => Ok(Some(ServerEvent::Pong)),
        other => {
            debug!(kind = %other, "unknown_stream_envelope");
            Ok(None)
        }
    }
}

/// Encode a `global` envelope (server side of the wire contract)
pub fn encode_global(snapshot: &GlobalSnapshot) -> String {
    json!({"type": "global", "data": snapshot}).to_string()
}

/// Encode a `tracks` envelope
pub fn encode_tracks(tracks: &[TrackSnapshot]) -> String {
    json!({"type": "tracks", "data": tracks}).to_string()
}

/// Encode a `pong` envelope
pub fn encode_pong() -> String {
    json!({"type": "pong"}).to_string()
}

/// Opens one connection per call; the stream client owns retry policy
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn Connection>>;
}

/// One established, full-duplex, message-framed connection
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, msg: ClientMessage) -> anyhow::Result<()>;

    /// Next decoded event; `None` means the remote closed the stream
    async fn recv(&mut self) -> Option<anyhow::Result<ServerEvent>>;

    /// Best-effort close of the underlying socket
    async fn close(&mut self);
}

/// Production transport: WebSocket via tokio-tungstenite
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn Connection>> {
        let url = Url::parse(url).with_context(|| format!("invalid stream url {url}"))?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("websocket connect to {url} failed"))?;
        Ok(Box::new(WsConnection { ws }))
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, msg: ClientMessage) -> anyhow::Result<()> {
        self.ws
            .send(Message::text(msg.to_text()))
            .await
            .context("websocket send failed")
    }

    async fn recv(&mut self) -> Option<anyhow::Result<ServerEvent>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => match parse_server_event(text.as_str()) {
                    Ok(Some(event)) => return Some(Ok(event)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                // Transport-level ping/pong is handled by tungstenite itself;
                // binary frames are not part of the contract
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Some(Err(anyhow!(e).context("websocket read failed"))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
