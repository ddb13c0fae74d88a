//! Synthetic feed generator
//!
//! Drives the crowd simulation on a fixed tick and emits the same event
//! shapes as the live stream, so the consumer cannot tell the sources apart.
//! Activated when the stream client gives up (auto-fallback) or when demo
//! mode is toggled on.

use crate::io::feed_channel::FeedSink;
use crate::services::simulation::{RandomSource, Simulation, ThreadRandom};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Emission cadence of the synthetic feed
pub const SYNTHETIC_TICK: Duration = Duration::from_secs(1);

pub struct SyntheticFeedGenerator {
    sink: FeedSink,
    tick: Duration,
    rng: Option<Box<dyn RandomSource>>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticFeedGenerator {
    pub fn new(sink: FeedSink) -> Self {
        Self { sink, tick: SYNTHETIC_TICK, rng: None, task: None }
    }

    /// Override the random source (tests); a restarted generator falls back
    /// to the thread RNG once the injected source has been consumed
    pub fn with_rng(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Override the tick interval (tests)
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start emitting; no-op if already running
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let rng = self.rng.take().unwrap_or_else(|| Box::new(ThreadRandom));
        let mut sim = Simulation::new(rng, self.tick);
        sim.seed_initial_crowd();

        let sink = self.sink.clone();
        let tick = self.tick;
        self.task = Some(tokio::spawn(async move {
            info!(tick_ms = tick.as_millis() as u64, "synthetic_feed_started");
            let mut ticker = tokio::time::interval(tick);
            loop {
                ticker.tick().await;
                let (snapshot, tracks) = sim.tick();
                sink.on_global(snapshot);
                sink.on_tracks(tracks);
            }
        }));
    }

    /// Stop emitting and drop all simulation state. Idempotent.
    ///
    /// The tick task has no await points inside a tick, so aborting it lands
    /// on a timer boundary and never mid-emission.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("synthetic_feed_stopped");
        }
    }
}

impl Drop for SyntheticFeedGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
