//! Shared test support: scripted in-memory transport and payload builders

#![allow(dead_code)]

use async_trait::async_trait;
use presence_feed::domain::types::{
    Demographics, GlobalSnapshot, HeatmapData, TrackId, TrackSnapshot, TrackState,
};
use presence_feed::io::transport::{ClientMessage, Connection, ServerEvent, Transport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Outcome of one scripted connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Succeed,
    Fail,
    /// Attempt never resolves (exercises cancellation of in-flight connects)
    Hang,
}

/// Transport whose connect attempts follow a script, falling back to a
/// default outcome once the script is exhausted. Successful attempts
/// register a server-side handle the test drives.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ConnectOutcome>>,
    default_outcome: ConnectOutcome,
    attempts: AtomicUsize,
    servers: Mutex<Vec<ServerHandle>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ConnectOutcome>, default_outcome: ConnectOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            default_outcome,
            attempts: AtomicUsize::new(0),
            servers: Mutex::new(Vec::new()),
        })
    }

    /// Every attempt refused
    pub fn failing() -> Arc<Self> {
        Self::new(Vec::new(), ConnectOutcome::Fail)
    }

    /// Every attempt accepted
    pub fn succeeding() -> Arc<Self> {
        Self::new(Vec::new(), ConnectOutcome::Succeed)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Server handle of the most recent successful attempt
    pub fn last_server(&self) -> ServerHandle {
        self.servers.lock().unwrap().last().expect("no successful connection yet").clone()
    }

    pub fn server_count(&self) -> usize {
        self.servers.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, _url: &str) -> anyhow::Result<Box<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_outcome);

        match outcome {
            ConnectOutcome::Hang => std::future::pending().await,
            ConnectOutcome::Fail => Err(anyhow::anyhow!("connection refused")),
            ConnectOutcome::Succeed => {
                let (event_tx, event_rx) = mpsc::unbounded_channel();
                let pings = Arc::new(AtomicUsize::new(0));
                let handle = ServerHandle {
                    inner: Arc::new(ServerInner {
                        event_tx: Mutex::new(Some(event_tx)),
                        pings: pings.clone(),
                    }),
                };
                self.servers.lock().unwrap().push(handle);
                Ok(Box::new(ScriptedConnection { event_rx, pings }))
            }
        }
    }
}

struct ServerInner {
    event_tx: Mutex<Option<mpsc::UnboundedSender<anyhow::Result<ServerEvent>>>>,
    pings: Arc<AtomicUsize>,
}

/// Test-side control of one established connection
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<ServerInner>,
}

impl ServerHandle {
    fn send(&self, event: anyhow::Result<ServerEvent>) {
        if let Some(tx) = self.inner.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn send_global(&self, snapshot: GlobalSnapshot) {
        self.send(Ok(ServerEvent::Global(snapshot)));
    }

    pub fn send_tracks(&self, tracks: Vec<TrackSnapshot>) {
        self.send(Ok(ServerEvent::Tracks(tracks)));
    }

    pub fn send_pong(&self) {
        self.send(Ok(ServerEvent::Pong));
    }

    pub fn send_error(&self, message: &str) {
        self.send(Err(anyhow::anyhow!("{message}")));
    }

    /// Drop the stream; the client observes a remote close
    pub fn close(&self) {
        self.inner.event_tx.lock().unwrap().take();
    }

    pub fn pings(&self) -> usize {
        self.inner.pings.load(Ordering::SeqCst)
    }
}

struct ScriptedConnection {
    event_rx: mpsc::UnboundedReceiver<anyhow::Result<ServerEvent>>,
    pings: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, msg: ClientMessage) -> anyhow::Result<()> {
        match msg {
            ClientMessage::Ping => {
                self.pings.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<anyhow::Result<ServerEvent>> {
        self.event_rx.recv().await
    }

    async fn close(&mut self) {
        self.event_rx.close();
    }
}

/// Minimal snapshot with a given queue length
pub fn snapshot_with_queue(queue: u32) -> GlobalSnapshot {
    snapshot_with_timestamp(queue, 0)
}

pub fn snapshot_with_timestamp(queue: u32, timestamp: i64) -> GlobalSnapshot {
    GlobalSnapshot {
        timestamp,
        entries: 0,
        exits: 0,
        current: queue,
        queue,
        demographics: Demographics::default(),
        heatmap: HeatmapData::default(),
    }
}

pub fn track(id: &str, dwell_sec: f64, state: TrackState) -> TrackSnapshot {
    TrackSnapshot {
        id: TrackId::from(id),
        bbox: [0.5, 0.5, 0.05, 0.1],
        gender: None,
        age_bucket: None,
        dwell_sec,
        state,
    }
}
