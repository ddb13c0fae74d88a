//! Live stream client with heartbeat monitoring and backoff reconnection
//!
//! Owns at most one connection attempt at a time to the configured endpoint.
//! The state machine runs in a worker task; the public handle sends commands
//! over a channel and reads state from a watch channel. Every wait (pending
//! connect, retry delay, heartbeat interval, liveness timeout) is a future
//! owned by the worker's current phase, so leaving a phase cancels it -- a
//! timer can never fire against torn-down state.
//!
//! Failure handling: all transport failures (connect failure, mid-session
//! disconnect, protocol error, heartbeat timeout) funnel into the same
//! reconnect path. Exhausting the retry table is not a failure; it is a
//! planned transition into `demo`, which only an explicit `connect()` leaves.

use crate::domain::types::ConnectionState;
use crate::io::feed_channel::FeedSink;
use crate::io::transport::{ClientMessage, Connection, ServerEvent, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Fixed backoff schedule; the final delay repeats for the last attempt
const RETRY_DELAYS: [Duration; 6] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
    Duration::from_secs(30),
];

/// Ping cadence while the connection is open
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Silence window after which the connection is declared dead
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    Disconnect,
}

/// Handle to the stream worker task
///
/// Dropping the handle tears the worker down (its command channel closes and
/// the worker exits after closing any open connection).
pub struct StreamClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl StreamClient {
    /// Spawn the worker task; the client starts in `idle` and does nothing
    /// until `connect()` is called. Must run inside a tokio runtime.
    pub fn spawn(url: String, transport: Arc<dyn Transport>, sink: FeedSink) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let worker = Worker {
            url,
            transport,
            sink,
            cmd_rx,
            state_tx,
            state: ConnectionState::Idle,
            retries: 0,
        };
        tokio::spawn(worker.run());

        Self { cmd_tx, state_rx }
    }

    /// Request a connection. No-op while already `connecting` or `open`;
    /// from `retrying` it cancels the pending delay and retries immediately.
    pub fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect);
    }

    /// Tear down the connection and all pending timers. Idempotent.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

/// Worker phase; each phase owns the futures that can wake it
enum Phase {
    Idle,
    Connecting,
    Open(Box<dyn Connection>),
    Retrying(Duration),
    Demo,
}

struct Worker {
    url: String,
    transport: Arc<dyn Transport>,
    sink: FeedSink,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    state: ConnectionState,
    retries: usize,
}

impl Worker {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => match self.cmd_rx.recv().await {
                    Some(Command::Connect) => {
                        self.set_state(ConnectionState::Connecting);
                        Phase::Connecting
                    }
                    Some(Command::Disconnect) => Phase::Idle,
                    None => return,
                },
                Phase::Demo => match self.cmd_rx.recv().await {
                    // Leaving demo requires an explicit connect request
                    Some(Command::Connect) => {
                        self.set_state(ConnectionState::Connecting);
                        Phase::Connecting
                    }
                    Some(Command::Disconnect) => self.go_idle(),
                    None => return,
                },
                Phase::Connecting => match self.drive_connect().await {
                    Some(next) => next,
                    None => return,
                },
                Phase::Open(conn) => match self.drive_open(conn).await {
                    Some(next) => next,
                    None => return,
                },
                Phase::Retrying(delay) => match self.drive_retry(delay).await {
                    Some(next) => next,
                    None => return,
                },
            };
        }
    }

    /// Explicit teardown: a later connect behaves like first-time use
    fn go_idle(&mut self) -> Phase {
        self.retries = 0;
        self.set_state(ConnectionState::Idle);
        Phase::Idle
    }

    /// Report a state transition exactly once per change
    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "stream_state");
            self.state = next;
            let _ = self.state_tx.send(next);
            self.sink.on_state(next);
        }
    }

    /// Enter the retrying phase with the delay for the current attempt
    fn schedule_reconnect(&mut self) -> Phase {
        let delay = RETRY_DELAYS[self.retries.min(RETRY_DELAYS.len() - 1)];
        info!(
            attempt = self.retries + 1,
            delay_ms = delay.as_millis() as u64,
            "stream_reconnect_scheduled"
        );
        self.set_state(ConnectionState::Retrying);
        Phase::Retrying(delay)
    }

    /// One in-flight connection attempt; cancelled if a disconnect arrives
    async fn drive_connect(&mut self) -> Option<Phase> {
        let transport = self.transport.clone();
        let url = self.url.clone();
        let attempt = transport.connect(&url);
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return Some(match result {
                        Ok(conn) => {
                            info!(url = %self.url, "stream_connected");
                            self.retries = 0;
                            self.set_state(ConnectionState::Open);
                            Phase::Open(conn)
                        }
                        Err(e) => {
                            warn!(error = %e, "stream_connect_failed");
                            self.sink.on_error(e.to_string());
                            self.set_state(ConnectionState::Closed);
                            self.schedule_reconnect()
                        }
                    });
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => continue,
                    Some(Command::Disconnect) => return Some(self.go_idle()),
                    None => return None,
                },
            }
        }
    }

    /// Open-connection loop: pump inbound events, send heartbeats, watch for
    /// silence. Any traffic (pong, global, tracks) resets the liveness clock.
    async fn drive_open(&mut self, mut conn: Box<dyn Connection>) -> Option<Phase> {
        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        let mut liveness_deadline = Instant::now() + HEARTBEAT_TIMEOUT;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => {}
                    Some(Command::Disconnect) => {
                        conn.close().await;
                        return Some(self.go_idle());
                    }
                    None => {
                        conn.close().await;
                        return None;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Err(e) = conn.send(ClientMessage::Ping).await {
                        warn!(error = %e, "stream_ping_failed");
                        self.sink.on_error(e.to_string());
                        conn.close().await;
                        self.set_state(ConnectionState::Closed);
                        return Some(self.schedule_reconnect());
                    }
                }
                message = conn.recv() => match message {
                    Some(Ok(event)) => {
                        liveness_deadline = Instant::now() + HEARTBEAT_TIMEOUT;
                        match event {
                            ServerEvent::Global(snapshot) => self.sink.on_global(snapshot),
                            ServerEvent::Tracks(tracks) => self.sink.on_tracks(tracks),
                            ServerEvent::Pong => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stream_read_error");
                        self.sink.on_error(e.to_string());
                        conn.close().await;
                        self.set_state(ConnectionState::Closed);
                        return Some(self.schedule_reconnect());
                    }
                    None => {
                        info!("stream_closed_by_remote");
                        self.set_state(ConnectionState::Closed);
                        return Some(self.schedule_reconnect());
                    }
                },
                _ = sleep_until(liveness_deadline) => {
                    // Silent failure: the socket looks open but nothing has
                    // arrived for the whole timeout window
                    warn!(
                        timeout_secs = HEARTBEAT_TIMEOUT.as_secs(),
                        "stream_heartbeat_timeout"
                    );
                    conn.close().await;
                    self.set_state(ConnectionState::Closed);
                    return Some(self.schedule_reconnect());
                }
            }
        }
    }

    /// Pending-retry phase: one timer, cancelled by connect or disconnect
    async fn drive_retry(&mut self, delay: Duration) -> Option<Phase> {
        let wake = sleep(delay);
        tokio::pin!(wake);

        tokio::select! {
            _ = &mut wake => {
                self.retries += 1;
                if self.retries >= RETRY_DELAYS.len() {
                    // Retry budget exhausted: planned fallback, not a failure.
                    // Counter resets so a later manual connect starts the
                    // schedule over.
                    info!(retries = self.retries, "stream_retry_budget_exhausted");
                    self.retries = 0;
                    self.set_state(ConnectionState::Demo);
                    Some(Phase::Demo)
                } else {
                    self.set_state(ConnectionState::Connecting);
                    Some(Phase::Connecting)
                }
            }
            cmd = self.cmd_rx.recv() => match cmd {
                // Explicit connect cancels the pending delay
                Some(Command::Connect) => {
                    self.set_state(ConnectionState::Connecting);
                    Some(Phase::Connecting)
                }
                Some(Command::Disconnect) => Some(self.go_idle()),
                None => None,
            },
        }
    }
}
