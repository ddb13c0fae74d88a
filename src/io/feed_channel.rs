//! Typed channel between feed sources and the store dispatcher
//!
//! Sources never touch store state directly; they hold a `FeedSink` and the
//! store's dispatcher task is the only consumer of the receiving end. Every
//! event is tagged with the source that produced it so the dispatcher can
//! discard stragglers from a source that is no longer authoritative.
//!
//! Sends are non-blocking (`try_send`); a full channel drops the event, which
//! is acceptable for a feed where the next tick supersedes the last.

use crate::domain::alert::Alert;
use crate::domain::types::{ConnectionState, GlobalSnapshot, TrackSnapshot};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Which upstream produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Live,
    Synthetic,
}

impl FeedSource {
    pub fn as_str(&self) -> &str {
        match self {
            FeedSource::Live => "live",
            FeedSource::Synthetic => "synthetic",
        }
    }
}

/// Events flowing from sources into the store dispatcher
#[derive(Debug)]
pub enum FeedEvent {
    /// Connection lifecycle change (live client only)
    State(ConnectionState),
    /// Fresh aggregate snapshot
    Global { source: FeedSource, snapshot: GlobalSnapshot },
    /// Full replacement of the active track list
    Tracks { source: FeedSource, tracks: Vec<TrackSnapshot> },
    /// Non-fatal source error, surfaced to the consumer as an alert
    SourceError { source: FeedSource, message: String },
    /// Alert raised by a control operation
    Alert(Alert),
}

/// Source-tagged sending half handed to each feed source
///
/// This is the only interface a source has to the store; it cannot observe
/// or mutate store state.
#[derive(Clone)]
pub struct FeedSink {
    source: FeedSource,
    tx: mpsc::Sender<FeedEvent>,
}

impl FeedSink {
    pub fn new(source: FeedSource, tx: mpsc::Sender<FeedEvent>) -> Self {
        Self { source, tx }
    }

    pub fn source(&self) -> FeedSource {
        self.source
    }

    pub fn on_state(&self, state: ConnectionState) {
        self.dispatch(FeedEvent::State(state));
    }

    pub fn on_global(&self, snapshot: GlobalSnapshot) {
        self.dispatch(FeedEvent::Global { source: self.source, snapshot });
    }

    pub fn on_tracks(&self, tracks: Vec<TrackSnapshot>) {
        self.dispatch(FeedEvent::Tracks { source: self.source, tracks });
    }

    pub fn on_error(&self, message: String) {
        self.dispatch(FeedEvent::SourceError { source: self.source, message });
    }

    pub fn raise(&self, alert: Alert) {
        self.dispatch(FeedEvent::Alert(alert));
    }

    fn dispatch(&self, event: FeedEvent) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                TrySendError::Full(_) => {
                    warn!(source = %self.source.as_str(), "feed_event_dropped: channel full");
                }
                TrySendError::Closed(_) => {
                    debug!(source = %self.source.as_str(), "feed_event_dropped: store gone");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_tags_events_with_source() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = FeedSink::new(FeedSource::Synthetic, tx);

        sink.on_tracks(Vec::new());

        match rx.recv().await.unwrap() {
            FeedEvent::Tracks { source, tracks } => {
                assert_eq!(source, FeedSource::Synthetic);
                assert!(tracks.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_after_store_gone_is_silent() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let sink = FeedSink::new(FeedSource::Live, tx);
        sink.on_state(ConnectionState::Connecting);
    }
}
