//! In-memory monitor store with per-record serialisation.
//!
//! Each record lives behind its own mutex so a check's write, a pause and a
//! delete for the same monitor are applied one after another, while records
//! of different monitors never contend. The id map is locked only to insert,
//! remove or look up a record.
//!
//! When a [`Database`] backend is attached every mutation is written through
//! while the record lock is held. The in-memory copy stays authoritative for
//! the running process; a failed write is logged, not propagated.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::types::{CheckResult, MonitorId, MonitorStatus, UserId};
use super::uptime::UptimeMode;
use crate::database::Database;
use crate::database::models::Monitor;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Monitor {0} not found")]
    NotFound(MonitorId),
}

/// Record slot. `removed` is set under the slot lock when the record is
/// deleted, so holders of a stale handle can tell.
struct Slot {
    monitor: Monitor,
    removed: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// Status change produced by [`MonitorStore::apply_check`]
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub previous: MonitorStatus,
    /// Record as written
    pub monitor: Monitor,
}

impl CheckOutcome {
    /// True when this check moved the monitor from a non-down status to down
    pub fn is_down_transition(&self) -> bool {
        self.previous != MonitorStatus::Down && self.monitor.status == MonitorStatus::Down
    }
}

#[derive(Default)]
pub struct MonitorStore {
    records: RwLock<HashMap<MonitorId, SlotRef>>,
    backend: Option<Arc<dyn Database>>,
}

impl MonitorStore {
    /// Store without durable backing
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that writes every mutation through to `backend`
    pub fn with_backend(backend: Arc<dyn Database>) -> Self {
        Self { records: RwLock::new(HashMap::new()), backend: Some(backend) }
    }

    /// Load every persisted monitor into memory, returning how many were loaded
    pub async fn hydrate(&self) -> anyhow::Result<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };

        let monitors = backend.list_monitors().await?;
        let count = monitors.len();
        let mut records = self.records.write().await;
        for monitor in monitors {
            records.insert(monitor.id, Arc::new(Mutex::new(Slot { monitor, removed: false })));
        }
        Ok(count)
    }

    async fn slot(&self, id: MonitorId) -> Option<SlotRef> {
        self.records.read().await.get(&id).cloned()
    }

    async fn persist(&self, monitor: &Monitor) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.save_monitor(monitor).await {
                warn!(monitor = %monitor.id, "Failed to persist monitor: {e:#}");
            }
        }
    }

    pub async fn get(&self, id: MonitorId) -> Option<Monitor> {
        let slot = self.slot(id).await?;
        let slot = slot.lock().await;
        (!slot.removed).then(|| slot.monitor.clone())
    }

    /// Insert a record, or replace the stored one with the same id
    pub async fn upsert(&self, monitor: Monitor) {
        loop {
            let slot = {
                let mut records = self.records.write().await;
                records
                    .entry(monitor.id)
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(Slot { monitor: monitor.clone(), removed: false }))
                    })
                    .clone()
            };

            let mut slot = slot.lock().await;
            if slot.removed {
                // Deleted between lookup and lock; the map no longer holds it
                continue;
            }
            slot.monitor = monitor;
            self.persist(&slot.monitor).await;
            return;
        }
    }

    /// Apply `change` to one record atomically and return the updated record
    pub async fn update<F>(&self, id: MonitorId, change: F) -> Result<Monitor, StoreError>
    where
        F: FnOnce(&mut Monitor),
    {
        let slot = self.slot(id).await.ok_or(StoreError::NotFound(id))?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(StoreError::NotFound(id));
        }

        change(&mut slot.monitor);
        self.persist(&slot.monitor).await;
        Ok(slot.monitor.clone())
    }

    /// Write a check result and the recomputed uptime in one step.
    ///
    /// Returns `NotFound` when the monitor was deleted after the check started;
    /// the result is then discarded and nothing is written.
    pub async fn apply_check(
        &self,
        result: &CheckResult,
        mode: UptimeMode,
    ) -> Result<CheckOutcome, StoreError> {
        let id = result.monitor_id;
        let slot = self.slot(id).await.ok_or(StoreError::NotFound(id))?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(StoreError::NotFound(id));
        }

        let monitor = &mut slot.monitor;
        let previous = monitor.status;
        monitor.uptime_percentage =
            mode.next(monitor.uptime_percentage, result.status, monitor.has_been_checked);
        monitor.status = result.status;
        monitor.last_checked = Some(result.checked_at);
        monitor.last_response_time_ms = Some(result.latency_ms);
        monitor.has_been_checked = true;

        self.persist(&slot.monitor).await;
        Ok(CheckOutcome { previous, monitor: slot.monitor.clone() })
    }

    /// Remove a record. Waits for any in-flight write on it to finish first.
    pub async fn delete(&self, id: MonitorId) -> Result<Monitor, StoreError> {
        let slot = self.records.write().await.remove(&id).ok_or(StoreError::NotFound(id))?;
        let mut slot = slot.lock().await;
        slot.removed = true;

        if let Some(backend) = &self.backend {
            if let Err(e) = backend.delete_monitor(id).await {
                warn!(monitor = %id, "Failed to delete persisted monitor: {e:#}");
            }
        }
        debug!(monitor = %id, "Monitor removed from store");
        Ok(slot.monitor.clone())
    }

    /// A user's monitors, active first, then by name
    pub async fn list_for_user(&self, user_id: UserId) -> Vec<Monitor> {
        let mut monitors = self.collect(|m| m.user_id == user_id).await;
        monitors.sort_by(|a, b| b.is_active.cmp(&a.is_active).then_with(|| a.name.cmp(&b.name)));
        monitors
    }

    /// Every monitor that should have a timer
    pub async fn list_active(&self) -> Vec<Monitor> {
        self.collect(|m| m.is_active).await
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    async fn collect(&self, keep: impl Fn(&Monitor) -> bool) -> Vec<Monitor> {
        let slots: Vec<SlotRef> = self.records.read().await.values().cloned().collect();
        let mut monitors = Vec::with_capacity(slots.len());
        for slot in slots {
            let slot = slot.lock().await;
            if !slot.removed && keep(&slot.monitor) {
                monitors.push(slot.monitor.clone());
            }
        }
        monitors
    }
}
