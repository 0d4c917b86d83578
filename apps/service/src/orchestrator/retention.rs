//! Automatic retention of check history.
//!
//! Every executed check leaves a row in `monitor_logs`. Rows older than
//! [`RetentionPolicy::history_days`] are deleted by a background task that
//! runs once an hour.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database::Database;

const CLEANUP_PERIOD: std::time::Duration = std::time::Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep check history
    pub history_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { history_days: 30 }
    }
}

impl RetentionPolicy {
    fn history_retention(&self) -> Duration {
        Duration::days(self.history_days.max(0))
    }
}

/// Cleanup manager for expired history
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete history past the retention window, returning how many rows went
    pub async fn cleanup_expired_history(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.policy.history_retention();
        debug!(
            "Cleaning up check history older than {} days (cutoff: {})",
            self.policy.history_days, cutoff
        );

        let deleted = self.database.cleanup_logs_before(cutoff).await?;
        if deleted > 0 {
            info!("Retention cleanup completed: {} history rows deleted", deleted);
        }
        Ok(deleted)
    }

    /// Start background cleanup task (runs every hour)
    pub fn start_periodic_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let database = Arc::clone(&self.database);
        let policy = self.policy.clone();

        tokio::spawn(async move {
            let cleanup = RetentionCleanup::new(database, policy);
            let mut interval = tokio::time::interval(CLEANUP_PERIOD);

            loop {
                interval.tick().await;

                match cleanup.cleanup_expired_history().await {
                    Ok(count) => debug!("Periodic history cleanup completed: {} deleted", count),
                    Err(e) => warn!("Periodic history cleanup failed: {e:#}"),
                }
            }
        })
    }
}
