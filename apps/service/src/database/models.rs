use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::i18n::Locale;
use crate::monitoring::types::{CheckResult, MonitorId, MonitorStatus, UserId};

/// Monitor model - one endpoint polled on its own interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    pub interval_seconds: u64,
    pub is_active: bool,
    pub status: MonitorStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub uptime_percentage: f64,
    pub has_been_checked: bool,
    pub created_at: DateTime<Utc>,
}

impl Monitor {
    /// Create a new, active, never-checked monitor
    pub fn new(user_id: UserId, name: String, url: String, interval_seconds: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            url,
            interval_seconds,
            is_active: true,
            status: MonitorStatus::Unknown,
            last_checked: None,
            last_response_time_ms: None,
            uptime_percentage: 100.0,
            has_been_checked: false,
            created_at: Utc::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// First eight characters of the id, enough to address a monitor in chat
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// User model - owner of monitors and recipient of alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Messaging destination alerts are delivered to
    pub chat_id: String,
    pub username: String,
    pub password_hash: String,
    pub locale: Locale,
    pub notifications_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// One executed check, kept for the history view until retention removes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorLog {
    pub id: Option<i64>,
    pub monitor_id: MonitorId,
    pub status: MonitorStatus,
    pub response_time_ms: Option<u64>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MonitorLog {
    pub fn from_check_result(result: &CheckResult) -> Self {
        Self {
            id: None,
            monitor_id: result.monitor_id,
            status: result.status,
            response_time_ms: Some(result.latency_ms),
            detail: Some(result.detail.clone()),
            created_at: result.checked_at,
        }
    }
}

/// Convert a timestamp to Unix milliseconds for storage
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_monitor_starts_active_and_unchecked() {
        let monitor = Monitor::new(Uuid::new_v4(), "site".into(), "http://a.test".into(), 60);
        assert!(monitor.is_active);
        assert_eq!(monitor.status, MonitorStatus::Unknown);
        assert_eq!(monitor.uptime_percentage, 100.0);
        assert!(!monitor.has_been_checked);
        assert!(monitor.last_checked.is_none());
        assert_eq!(monitor.interval(), Duration::from_secs(60));
        assert_eq!(monitor.short_id().len(), 8);
        assert!(monitor.id.simple().to_string().starts_with(&monitor.short_id()));
    }

    #[test]
    fn timestamps_survive_storage_conversion() {
        let now = Utc::now();
        let restored = i64_to_timestamp(timestamp_to_i64(now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }
}
