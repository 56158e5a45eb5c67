//! Row definitions for monitors, samples, events and notifications
//!
//! ## Design Philosophy
//!
//! Monitors and notifications carry an **opaque JSON payload** next to their
//! typed columns. Only the matching probe or channel provider interprets it,
//! so adding a provider never requires a schema migration.
//!
//! Samples and events are **append-only**: they are created once and never
//! mutated. Samples are queried by time range for charts and aggregates,
//! events by recency.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical availability of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorStatus {
    Up,
    Down,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "UP"),
            MonitorStatus::Down => write!(f, "DOWN"),
        }
    }
}

impl FromStr for MonitorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(MonitorStatus::Up),
            "DOWN" => Ok(MonitorStatus::Down),
            other => Err(format!("unknown monitor status: {other}")),
        }
    }
}

/// A persisted monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub id: String,

    /// Owning workspace, also the scope for live updates
    pub workspace_id: String,

    pub name: String,

    /// Probe type tag (`http`, `ping`, `tcp`, ...)
    pub probe_type: String,

    pub active: bool,

    /// Seconds between the end of one check and the start of the next
    pub interval_secs: u64,

    /// Provider-specific configuration, interpreted only by the probe
    pub payload: serde_json::Value,

    /// Attached notification identities, in order
    pub notification_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One probe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub monitor_id: String,

    /// Non-negative: successful probe (latency or custom metric).
    /// Negative: failure sentinel.
    pub value: i64,

    pub created_at: DateTime<Utc>,
}

impl SampleRow {
    pub fn new(monitor_id: impl Into<String>, value: i64) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            value,
            created_at: Utc::now(),
        }
    }
}

/// A state transition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub monitor_id: String,
    pub kind: MonitorStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn new(monitor_id: impl Into<String>, kind: MonitorStatus, message: impl Into<String>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            kind,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// A notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub name: String,

    /// Channel type tag (`telegram`, `discord`, `webhook`, ...)
    pub channel_type: String,

    /// Channel-specific configuration, interpreted only by the channel
    pub payload: serde_json::Value,
}

/// Aggregate view over a window of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UptimeStats {
    /// Mean sample value, `-1.0` when the window is empty
    pub average_value: f64,

    /// Samples with value >= 0
    pub up_count: u64,

    /// Samples with value < 0
    pub down_count: u64,
}

impl UptimeStats {
    pub fn empty() -> Self {
        Self {
            average_value: -1.0,
            up_count: 0,
            down_count: 0,
        }
    }

    /// Uptime percentage, `None` when no samples exist
    pub fn uptime_percentage(&self) -> Option<f64> {
        let total = self.up_count + self.down_count;
        if total == 0 {
            return None;
        }
        Some(self.up_count as f64 / total as f64 * 100.0)
    }

    /// Build stats from raw sample values
    pub fn from_values(values: impl IntoIterator<Item = i64>) -> Self {
        let mut sum = 0i128;
        let mut count = 0u64;
        let mut up_count = 0;
        let mut down_count = 0;

        for value in values {
            sum += value as i128;
            count += 1;
            if value >= 0 {
                up_count += 1;
            } else {
                down_count += 1;
            }
        }

        if count == 0 {
            return Self::empty();
        }

        Self {
            average_value: sum as f64 / count as f64,
            up_count,
            down_count,
        }
    }
}
