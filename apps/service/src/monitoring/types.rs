use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::Monitor;

/// Opaque identity of a monitor.
pub type MonitorId = Uuid;

/// Opaque identity of the user owning monitors.
pub type UserId = Uuid;

/// Status of a monitor as last observed by a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl MonitorStatus {
    /// Parse the column value written by [`MonitorStatus`]'s `Display`.
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            _ => MonitorStatus::Unknown,
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of a single probe against a monitor's url
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Monitor that was checked
    pub monitor_id: MonitorId,

    /// Up or down; a check never yields `Unknown`
    pub status: MonitorStatus,

    /// Measured latency, or `interval * 1000` when the request failed
    pub latency_ms: u64,

    /// Status line for received responses, error text otherwise
    pub detail: String,

    /// When the check completed
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    /// A response arrived with a status code below 400.
    pub fn up(monitor: &Monitor, latency_ms: u64, detail: impl Into<String>) -> Self {
        Self::completed(monitor, MonitorStatus::Up, latency_ms, detail.into())
    }

    /// A response arrived but its status code was 400 or above.
    pub fn rejected(monitor: &Monitor, latency_ms: u64, detail: impl Into<String>) -> Self {
        Self::completed(monitor, MonitorStatus::Down, latency_ms, detail.into())
    }

    /// No response: network error or timeout. Latency saturates at the interval.
    pub fn failure(monitor: &Monitor, error: impl Into<String>) -> Self {
        let latency_ms = monitor.interval_seconds.saturating_mul(1000);
        Self::completed(monitor, MonitorStatus::Down, latency_ms, error.into())
    }

    fn completed(monitor: &Monitor, status: MonitorStatus, latency_ms: u64, detail: String) -> Self {
        Self { monitor_id: monitor.id, status, latency_ms, detail, checked_at: Utc::now() }
    }
}
