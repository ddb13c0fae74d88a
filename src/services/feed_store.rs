//! Feed store - the single owner of presence-feed state
//!
//! Holds which source is authoritative (live stream vs synthetic), the
//! current snapshot and track list, the bounded history window and the
//! active alert list. Everything the rest of the application reads comes
//! from here; everything sources produce arrives through the feed channel
//! and is applied by one dispatcher task, so there is exactly one writer.
//!
//! Source selection: the live client is authoritative unless a synthetic
//! generator is running. The dispatcher checks the originating source
//! against the active one under the same lock that teardown operations
//! take, so a stopping source's queued stragglers can never mutate state
//! after a switch or a reset.

use crate::domain::alert::{Alert, AlertSeverity};
use crate::domain::types::{ConnectionState, GlobalSnapshot, TrackSnapshot};
use crate::io::feed_channel::{FeedEvent, FeedSink, FeedSource};
use crate::io::stream::StreamClient;
use crate::io::transport::{Transport, WsTransport};
use crate::services::alerts::{long_dwell_alerts, queue_alert, AlertCenter};
use crate::services::synthetic::SyntheticFeedGenerator;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Bounded history window (10 minutes at one snapshot per second)
pub const HISTORY_CAPACITY: usize = 600;

const FEED_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct FeedState {
    connection_state: ConnectionState,
    demo_mode: bool,
    /// The auto-fallback warning is raised once per connection session
    demo_fallback_noticed: bool,
    current: Option<GlobalSnapshot>,
    tracks: Vec<TrackSnapshot>,
    history: VecDeque<GlobalSnapshot>,
    alerts: AlertCenter,
}

impl FeedState {
    fn reset(&mut self) {
        self.connection_state = ConnectionState::Idle;
        self.demo_mode = false;
        self.demo_fallback_noticed = false;
        self.current = None;
        self.tracks.clear();
        self.history.clear();
        // Active alerts keep ticking down; they expire on their own
    }
}

#[derive(Default)]
struct Sources {
    client: Option<StreamClient>,
    generator: Option<SyntheticFeedGenerator>,
}

struct Inner {
    // Lock order: `sources` before `state`, never the other way around.
    // Teardown holds `sources` across its state reset and the dispatcher
    // holds it across check-and-apply, which is what keeps a straggler
    // event from a stopped source out of freshly reset state.
    state: Mutex<FeedState>,
    sources: Mutex<Sources>,
    event_tx: mpsc::Sender<FeedEvent>,
    transport: Arc<dyn Transport>,
}

/// One explicitly constructed instance owned by the application wiring;
/// `init_connection`/`disconnect` bound its lifecycle.
pub struct FeedStore {
    inner: Arc<Inner>,
    dispatcher: JoinHandle<()>,
}

impl FeedStore {
    /// Create a store wired to the production WebSocket transport.
    /// Must run inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(WsTransport))
    }

    /// Create a store with an injected transport (tests)
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            state: Mutex::new(FeedState::default()),
            sources: Mutex::new(Sources::default()),
            event_tx,
            transport,
        });

        let dispatcher = tokio::spawn(run_dispatcher(inner.clone(), event_rx));
        Self { inner, dispatcher }
    }

    /// Tear down any existing live client and connect to the given endpoint
    pub fn init_connection(&self, url: &str) {
        info!(url = %url, "feed_init_connection");
        let mut sources = self.inner.sources.lock();
        if let Some(old) = sources.client.take() {
            old.disconnect();
        }

        let sink = FeedSink::new(FeedSource::Live, self.inner.event_tx.clone());
        let client = StreamClient::spawn(url.to_string(), self.inner.transport.clone(), sink);
        client.connect();
        sources.client = Some(client);
    }

    /// Tear down both sources and reset all derived state
    pub fn disconnect(&self) {
        info!("feed_disconnect");
        let mut sources = self.inner.sources.lock();
        if let Some(client) = sources.client.take() {
            client.disconnect();
        }
        if let Some(mut generator) = sources.generator.take() {
            generator.stop();
        }
        self.inner.state.lock().reset();
    }

    /// Switch between the live stream and the synthetic feed
    pub fn toggle_demo_mode(&self) {
        let mut sources = self.inner.sources.lock();
        let demo_active = sources.generator.as_ref().is_some_and(|g| g.is_running());

        if demo_active {
            info!("demo_mode_off");
            if let Some(mut generator) = sources.generator.take() {
                generator.stop();
            }
            self.inner.state.lock().demo_mode = false;
            if let Some(client) = sources.client.as_ref() {
                client.connect();
            }
            drop(sources);
            self.raise(Alert::new(
                AlertSeverity::Success,
                "Live Mode",
                "Attempting to connect to live stream...",
            ));
        } else {
            info!("demo_mode_on");
            if let Some(client) = sources.client.as_ref() {
                client.disconnect();
            }
            let sink = FeedSink::new(FeedSource::Synthetic, self.inner.event_tx.clone());
            let mut generator = SyntheticFeedGenerator::new(sink);
            generator.start();
            sources.generator = Some(generator);

            let mut state = self.inner.state.lock();
            state.demo_mode = true;
            state.connection_state = ConnectionState::Demo;
            drop(state);
            drop(sources);
            self.raise(Alert::new(AlertSeverity::Info, "Demo Mode", "Now showing simulated data."));
        }
    }

    /// Remove an alert before its TTL elapses
    pub fn dismiss_alert(&self, id: &str) -> bool {
        self.inner.state.lock().alerts.dismiss(id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().connection_state
    }

    pub fn is_demo_mode(&self) -> bool {
        self.inner.state.lock().demo_mode
    }

    /// Latest snapshot; `None` until either source has produced one
    pub fn snapshot(&self) -> Option<GlobalSnapshot> {
        self.inner.state.lock().current.clone()
    }

    pub fn tracks(&self) -> Vec<TrackSnapshot> {
        self.inner.state.lock().tracks.clone()
    }

    pub fn history(&self) -> Vec<GlobalSnapshot> {
        self.inner.state.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.state.lock().history.len()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.inner.state.lock().alerts.alerts()
    }

    /// Route a control-op alert through the dispatcher so its expiry timer
    /// is armed immediately
    fn raise(&self, alert: Alert) {
        if self.inner.event_tx.try_send(FeedEvent::Alert(alert)).is_err() {
            debug!("alert_dropped: dispatcher gone");
        }
    }
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FeedStore {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Single writer of feed state: drains the source channel and expires alerts
async fn run_dispatcher(inner: Arc<Inner>, mut event_rx: mpsc::Receiver<FeedEvent>) {
    loop {
        let deadline = inner.state.lock().alerts.next_deadline();
        let event = match deadline {
            Some(deadline) => tokio::select! {
                event = event_rx.recv() => event,
                _ = sleep_until(deadline) => {
                    let expired = inner.state.lock().alerts.expire(Instant::now());
                    if expired > 0 {
                        debug!(expired, "alerts_expired");
                    }
                    continue;
                }
            },
            None => event_rx.recv().await,
        };

        match event {
            Some(event) => handle_event(&inner, event),
            None => return,
        }
    }
}

/// Whether events from this source may mutate state right now
fn event_allowed(sources: &Sources, feed: &FeedState, source: FeedSource) -> bool {
    match source {
        FeedSource::Live => sources.client.is_some() && !feed.demo_mode,
        FeedSource::Synthetic => sources.generator.as_ref().is_some_and(|g| g.is_running()),
    }
}

fn handle_event(inner: &Arc<Inner>, event: FeedEvent) {
    let now = Instant::now();
    match event {
        FeedEvent::State(state) => on_connection_state(inner, state, now),
        FeedEvent::Global { source, snapshot } => on_global(inner, source, snapshot, now),
        FeedEvent::Tracks { source, tracks } => on_tracks(inner, source, tracks, now),
        FeedEvent::SourceError { source, message } => {
            warn!(source = %source.as_str(), error = %message, "feed_source_error");
            let alert = Alert::new(AlertSeverity::Error, "Connection Error", message);
            inner.state.lock().alerts.push(alert, now);
        }
        FeedEvent::Alert(alert) => inner.state.lock().alerts.push(alert, now),
    }
}

fn on_connection_state(inner: &Arc<Inner>, state: ConnectionState, now: Instant) {
    let mut sources = inner.sources.lock();
    let mut feed = inner.state.lock();
    if !event_allowed(&sources, &feed, FeedSource::Live) {
        // A stopping client's trailing notification must not overwrite what
        // the consumer is currently seeing
        debug!(state = %state, "stale_live_state_dropped");
        return;
    }

    debug!(state = %state, "feed_connection_state");
    feed.connection_state = state;

    if state == ConnectionState::Demo {
        // Retry budget exhausted: fall back to the synthetic feed without
        // any manual toggle
        if sources.generator.as_ref().is_some_and(|g| g.is_running()) {
            return;
        }
        let sink = FeedSink::new(FeedSource::Synthetic, inner.event_tx.clone());
        let mut generator = SyntheticFeedGenerator::new(sink);
        generator.start();
        sources.generator = Some(generator);

        feed.demo_mode = true;
        if !feed.demo_fallback_noticed {
            feed.demo_fallback_noticed = true;
            let alert = Alert::new(
                AlertSeverity::Warning,
                "Demo Mode",
                "Live connection unavailable. Showing simulated data.",
            );
            feed.alerts.push(alert, now);
        }
    }
}

fn on_global(inner: &Arc<Inner>, source: FeedSource, snapshot: GlobalSnapshot, now: Instant) {
    let sources = inner.sources.lock();
    let mut feed = inner.state.lock();
    if !event_allowed(&sources, &feed, source) {
        debug!(source = %source.as_str(), "inactive_source_snapshot_dropped");
        return;
    }

    if feed.history.len() >= HISTORY_CAPACITY {
        feed.history.pop_front();
    }
    feed.history.push_back(snapshot.clone());

    if let Some(alert) = queue_alert(&snapshot) {
        feed.alerts.push(alert, now);
    }
    feed.current = Some(snapshot);
}

fn on_tracks(inner: &Arc<Inner>, source: FeedSource, tracks: Vec<TrackSnapshot>, now: Instant) {
    let sources = inner.sources.lock();
    let mut feed = inner.state.lock();
    if !event_allowed(&sources, &feed, source) {
        debug!(source = %source.as_str(), "inactive_source_tracks_dropped");
        return;
    }

    for alert in long_dwell_alerts(&tracks) {
        feed.alerts.push(alert, now);
    }
    feed.tracks = tracks;
}
