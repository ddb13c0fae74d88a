//! Alert rules and TTL-based lifecycle
//!
//! Rules are evaluated every time fresh data arrives; there is no
//! deduplication beyond the natural rate limiting of data arrival. The
//! `AlertCenter` owns the active list and expires entries when their
//! time-to-live elapses (driven by the store dispatcher's timer).

use crate::domain::alert::{Alert, AlertSeverity};
use crate::domain::types::{GlobalSnapshot, TrackSnapshot, TrackState};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Queue lengths strictly greater than this raise a warning
pub const QUEUE_ALERT_THRESHOLD: u32 = 8;

/// Present tracks dwelling strictly longer than this raise a notice
pub const LONG_DWELL_ALERT_SECS: f64 = 600.0;

const QUEUE_ALERT_TTL: Duration = Duration::from_secs(5);
const LONG_DWELL_ALERT_TTL: Duration = Duration::from_secs(3);

/// Queue-pressure rule
pub fn queue_alert(snapshot: &GlobalSnapshot) -> Option<Alert> {
    if snapshot.queue > QUEUE_ALERT_THRESHOLD {
        Some(
            Alert::new(
                AlertSeverity::Warning,
                "High Queue Count",
                format!("Queue has {} people waiting.", snapshot.queue),
            )
            .with_ttl(QUEUE_ALERT_TTL),
        )
    } else {
        None
    }
}

/// Long-dwell rule, one alert per qualifying track
pub fn long_dwell_alerts(tracks: &[TrackSnapshot]) -> Vec<Alert> {
    tracks
        .iter()
        .filter(|t| t.state == TrackState::Present && t.dwell_sec > LONG_DWELL_ALERT_SECS)
        .map(|t| {
            Alert::new(
                AlertSeverity::Info,
                "Long Dwell Time",
                format!(
                    "Person {} has been present for {} minutes.",
                    t.id,
                    (t.dwell_sec / 60.0) as u64
                ),
            )
            .with_ttl(LONG_DWELL_ALERT_TTL)
        })
        .collect()
}

struct ActiveAlert {
    alert: Alert,
    expires_at: Instant,
}

/// Bounded-lifetime alert list
#[derive(Default)]
pub struct AlertCenter {
    active: Vec<ActiveAlert>,
}

impl AlertCenter {
    pub fn new() -> Self {
        Self { active: Vec::new() }
    }

    pub fn push(&mut self, alert: Alert, now: Instant) {
        debug!(
            id = %alert.id,
            severity = %alert.severity.as_str(),
            title = %alert.title,
            "alert_raised"
        );
        let expires_at = now + alert.ttl;
        self.active.push(ActiveAlert { alert, expires_at });
    }

    /// Remove an alert before its TTL elapses; returns whether it existed
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.active.len();
        self.active.retain(|a| a.alert.id != id);
        self.active.len() != before
    }

    /// Drop every alert whose TTL has elapsed; returns how many were removed
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.active.len();
        self.active.retain(|a| a.expires_at > now);
        before - self.active.len()
    }

    /// Earliest pending expiry, if any alerts are active
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.iter().map(|a| a.expires_at).min()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.active.iter().map(|a| a.alert.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
