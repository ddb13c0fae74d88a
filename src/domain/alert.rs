//! User-facing alert notifications
//!
//! Alerts are short-lived values derived from threshold evaluation over the
//! incoming feed (or raised directly by control operations). They expire on
//! their own after a time-to-live; consumers may also dismiss them by id.

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Default time-to-live for alerts that do not override it
pub const DEFAULT_ALERT_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Success => "success",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
        }
    }
}

/// Ephemeral notification shown to the consumer
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// Creation time (epoch milliseconds)
    pub timestamp: i64,
    #[serde(skip)]
    pub ttl: Duration,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
            ttl: DEFAULT_ALERT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}
