//! Shared types for the presence feed
//!
//! Wire-visible structs use camelCase field names to match the backend
//! stream contract; enums serialize lowercase.

use serde::{Deserialize, Serialize};

/// Newtype wrapper for track IDs to provide type safety
///
/// Ids are opaque strings assigned by whichever source produced the track.
/// They are unique among concurrently active tracks; a retired id may be
/// reused later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub String);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        TrackId(s.to_string())
    }
}

/// Gender category reported by the upstream demographics model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderKey {
    Male,
    Female,
    Unknown,
}

/// Age bucket reported by the upstream demographics model
///
/// Ordered: child (0-17), young (18-35), adult (36-50), mature (51-70),
/// senior (70+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBucket {
    Child,
    Young,
    Adult,
    Mature,
    Senior,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 5] = [
        AgeBucket::Child,
        AgeBucket::Young,
        AgeBucket::Adult,
        AgeBucket::Mature,
        AgeBucket::Senior,
    ];
}

/// Per-gender headcount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderBreakdown {
    pub male: u32,
    pub female: u32,
    pub unknown: u32,
}

impl GenderBreakdown {
    pub fn tally(&mut self, gender: GenderKey) {
        match gender {
            GenderKey::Male => self.male += 1,
            GenderKey::Female => self.female += 1,
            GenderKey::Unknown => self.unknown += 1,
        }
    }
}

/// Per-age-bucket headcount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeBreakdown {
    pub child: u32,
    pub young: u32,
    pub adult: u32,
    pub mature: u32,
    pub senior: u32,
}

impl AgeBreakdown {
    pub fn tally(&mut self, bucket: AgeBucket) {
        match bucket {
            AgeBucket::Child => self.child += 1,
            AgeBucket::Young => self.young += 1,
            AgeBucket::Adult => self.adult += 1,
            AgeBucket::Mature => self.mature += 1,
            AgeBucket::Senior => self.senior += 1,
        }
    }
}

/// Demographic breakdown of the currently observed crowd
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub gender: GenderBreakdown,
    pub ages: AgeBreakdown,
}

/// One heatmap sample in normalized frame space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    /// Normalized 0..1
    pub x: f64,
    /// Normalized 0..1
    pub y: f64,
    /// Normalized 0..1, relative to the hottest cell
    pub intensity: f64,
}

/// Heatmap payload: sparse points plus the grid they were sampled from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapData {
    pub points: Vec<HeatPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_height: Option<u32>,
}

/// Aggregate metrics for one tick of observation
///
/// Immutable value produced by whichever source is active; the store keeps
/// the latest one plus a bounded history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    /// Wall-clock timestamp (epoch milliseconds)
    pub timestamp: i64,
    /// Cumulative entries since the source started (monotonic)
    pub entries: u64,
    /// Cumulative exits since the source started (monotonic)
    pub exits: u64,
    /// Current occupancy
    pub current: u32,
    /// People currently in the queue zone (subset of `current`)
    pub queue: u32,
    pub demographics: Demographics,
    pub heatmap: HeatmapData,
}

/// Track lifecycle state
///
/// `entering → present → exiting → lost`; `lost` is terminal and the track
/// is retired from the active set right after it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Entering,
    Present,
    Exiting,
    Lost,
}

impl TrackState {
    pub fn as_str(&self) -> &str {
        match self {
            TrackState::Entering => "entering",
            TrackState::Present => "present",
            TrackState::Exiting => "exiting",
            TrackState::Lost => "lost",
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackState::Lost)
    }

    /// Whether a track in this state counts toward current occupancy
    pub fn counts_toward_occupancy(&self) -> bool {
        matches!(self, TrackState::Entering | TrackState::Present)
    }
}

/// One actively observed person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub id: TrackId,
    /// Normalized bounding box [x, y, w, h], all in 0..1
    pub bbox: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<GenderKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_bucket: Option<AgeBucket>,
    /// Seconds observed so far; non-decreasing while the track is active
    pub dwell_sec: f64,
    pub state: TrackState,
}

/// Connection lifecycle of the live stream client
///
/// `idle → connecting → open`, with `closed → retrying` on any failure and
/// `retrying → demo` once the retry budget is exhausted. `demo` only leaves
/// via an explicit connect request. There is no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Retrying,
    Demo,
}

impl ConnectionState {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Retrying => "retrying",
            ConnectionState::Demo => "demo",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
