//! Synthetic crowd simulation
//!
//! Pure tick logic with no timers attached: each `tick()` advances every
//! active track through the lifecycle, occasionally admits a new arrival,
//! jitters the people on the floor, updates the decaying occupancy grid and
//! derives the aggregate snapshot. The generator wraps this in a timer task.
//!
//! Randomness comes from an injected `RandomSource` so tests can script the
//! per-tick creation/transition draws; production uses the thread RNG. This
//! is a plausibility simulation, not a reproducible fixture -- invariants
//! (non-negative counts, monotonic cumulative counters, bounded grid) are
//! what matter, not exact values.

use crate::domain::types::{
    AgeBucket, Demographics, GenderKey, GlobalSnapshot, TrackId, TrackSnapshot, TrackState,
};
use crate::services::heatmap::OccupancyGrid;
use chrono::Utc;
use rand::Rng as _;
use std::time::Duration;

/// Maximum concurrently active tracks
const MAX_TRACKS: usize = 15;

/// A new track is admitted when the per-tick draw exceeds this
const SPAWN_THRESHOLD: f64 = 0.7;

/// Dwell after which an entering track settles into `present`
const ENTER_DWELL_SECS: f64 = 2.0;

/// Dwell before a present track may start exiting
const SOAK_DWELL_SECS: f64 = 15.0;

/// A soaked present track starts exiting when its draw exceeds this
const EXIT_THRESHOLD: f64 = 0.95;

/// Dwell at which an exiting track is lost
const LOST_DWELL_SECS: f64 = 18.0;

/// Tracks left of this x-position count toward the queue
const QUEUE_ZONE_MAX_X: f64 = 0.3;

/// Jitter keeps positions at least this far from the frame edges
const EDGE_MARGIN: f64 = 0.05;

/// Full range of per-tick positional jitter (centered on zero)
const JITTER_RANGE: f64 = 0.02;

/// Uniform [0, 1) random draws for the simulation
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;
}

/// Production source backed by the thread RNG
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&mut self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Deterministic source cycling through a fixed sequence of draws
pub struct CycleRandom {
    values: Vec<f64>,
    next: usize,
}

impl CycleRandom {
    pub fn new(values: Vec<f64>) -> Self {
        assert!(!values.is_empty(), "CycleRandom needs at least one value");
        Self { values, next: 0 }
    }
}

impl RandomSource for CycleRandom {
    fn next_f64(&mut self) -> f64 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

pub struct Simulation {
    rng: Box<dyn RandomSource>,
    tick_secs: f64,
    next_track_seq: u64,
    tracks: Vec<TrackSnapshot>,
    entries: u64,
    exits: u64,
    grid: OccupancyGrid,
}

impl Simulation {
    pub fn new(rng: Box<dyn RandomSource>, tick: Duration) -> Self {
        Self {
            rng,
            tick_secs: tick.as_secs_f64(),
            next_track_seq: 1000,
            tracks: Vec::new(),
            entries: 0,
            exits: 0,
            grid: OccupancyGrid::new(),
        }
    }

    /// Populate the floor with a plausible starting crowd (3-7 people)
    pub fn seed_initial_crowd(&mut self) {
        let count = 3 + (self.rng.next_f64() * 5.0) as usize;
        for _ in 0..count {
            self.spawn_track();
        }
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn exits(&self) -> u64 {
        self.exits
    }

    pub fn active_count(&self) -> usize {
        self.tracks.iter().filter(|t| !t.state.is_terminal()).count()
    }

    /// Advance the simulation by one tick and derive the emitted values.
    ///
    /// Tracks that reached `lost` are reported once (so consumers observe the
    /// terminal transition) and retired at the start of the following tick.
    pub fn tick(&mut self) -> (GlobalSnapshot, Vec<TrackSnapshot>) {
        self.tracks.retain(|t| !t.state.is_terminal());

        self.advance_lifecycle();

        // Admit a new arrival with fixed probability, bounded by the cap
        let draw = self.rng.next_f64();
        if draw > SPAWN_THRESHOLD && self.tracks.len() < MAX_TRACKS {
            self.spawn_track();
        }

        for track in &self.tracks {
            if track.state == TrackState::Present {
                self.grid.deposit(track.bbox[0], track.bbox[1]);
            }
        }
        self.grid.decay();

        (self.build_snapshot(), self.tracks.clone())
    }

    /// Advance dwell and apply lifecycle transitions; freshly `present`
    /// tracks also get their positional jitter here.
    fn advance_lifecycle(&mut self) {
        for i in 0..self.tracks.len() {
            self.tracks[i].dwell_sec += self.tick_secs;
            let dwell = self.tracks[i].dwell_sec;

            match self.tracks[i].state {
                TrackState::Entering if dwell > ENTER_DWELL_SECS => {
                    self.tracks[i].state = TrackState::Present;
                }
                TrackState::Present if dwell > SOAK_DWELL_SECS => {
                    if self.rng.next_f64() > EXIT_THRESHOLD {
                        self.tracks[i].state = TrackState::Exiting;
                    }
                }
                TrackState::Exiting if dwell > LOST_DWELL_SECS => {
                    self.tracks[i].state = TrackState::Lost;
                    self.exits += 1;
                }
                _ => {}
            }

            if self.tracks[i].state == TrackState::Present {
                let dx = (self.rng.next_f64() - 0.5) * JITTER_RANGE;
                let dy = (self.rng.next_f64() - 0.5) * JITTER_RANGE;
                let bbox = &mut self.tracks[i].bbox;
                bbox[0] = (bbox[0] + dx).clamp(EDGE_MARGIN, 1.0 - EDGE_MARGIN);
                bbox[1] = (bbox[1] + dy).clamp(EDGE_MARGIN, 1.0 - EDGE_MARGIN);
            }
        }
    }

    /// Create a fresh track at a random position inside the safe margin.
    /// An entry is counted at first observation, not when the track settles.
    fn spawn_track(&mut self) {
        let id = TrackId(format!("sim-{}", self.next_track_seq));
        self.next_track_seq += 1;

        let x = 0.1 + self.rng.next_f64() * 0.8;
        let y = 0.1 + self.rng.next_f64() * 0.8;
        let w = 0.05 + self.rng.next_f64() * 0.05;
        let h = 0.08 + self.rng.next_f64() * 0.08;

        const GENDERS: [GenderKey; 3] = [GenderKey::Male, GenderKey::Female, GenderKey::Unknown];
        let gender = GENDERS[pick_index(self.rng.next_f64(), GENDERS.len())];
        let age = AgeBucket::ALL[pick_index(self.rng.next_f64(), AgeBucket::ALL.len())];

        self.tracks.push(TrackSnapshot {
            id,
            bbox: [x, y, w, h],
            gender: Some(gender),
            age_bucket: Some(age),
            dwell_sec: 0.0,
            state: TrackState::Entering,
        });
        self.entries += 1;
    }

    fn build_snapshot(&self) -> GlobalSnapshot {
        let on_floor: Vec<&TrackSnapshot> = self
            .tracks
            .iter()
            .filter(|t| t.state.counts_toward_occupancy())
            .collect();

        let queue = on_floor
            .iter()
            .filter(|t| t.bbox[0] < QUEUE_ZONE_MAX_X)
            .count() as u32;

        let mut demographics = Demographics::default();
        for track in &on_floor {
            if let Some(gender) = track.gender {
                demographics.gender.tally(gender);
            }
            if let Some(age) = track.age_bucket {
                demographics.ages.tally(age);
            }
        }

        GlobalSnapshot {
            timestamp: Utc::now().timestamp_millis(),
            entries: self.entries,
            exits: self.exits,
            current: on_floor.len() as u32,
            queue,
            demographics,
            heatmap: self.grid.heatmap(),
        }
    }
}

/// Map a [0, 1) draw onto an index into a slice of the given length
fn pick_index(draw: f64, len: usize) -> usize {
    ((draw * len as f64) as usize).min(len - 1)
}
