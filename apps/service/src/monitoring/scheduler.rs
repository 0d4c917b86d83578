//! Per-monitor check scheduling.
//!
//! Every active monitor owns one timer task that fires once per interval,
//! starting one full period after it is armed. A fire never runs the check
//! inline: it spawns the check as its own task, so a slow target delays
//! nothing but itself. Missed ticks are skipped.
//!
//! Timer handles live in an id map behind one async mutex. Control
//! operations hold it across the store write and the arm/disarm that follows,
//! which keeps "armed" and "active" in step. Check tasks never take it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::alerts::AlertDispatcher;
use super::checker::Checker;
use super::store::{MonitorStore, StoreError};
use super::types::{MonitorId, UserId};
use super::uptime::UptimeMode;
use super::validation::{self, MIN_INTERVAL_SECONDS, ValidationError};
use crate::database::Database;
use crate::database::models::{Monitor, MonitorLog};

/// Request to create a monitor
#[derive(Debug, Clone)]
pub struct NewMonitor {
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub uptime_mode: UptimeMode,
    pub min_interval_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { uptime_mode: UptimeMode::default(), min_interval_seconds: MIN_INTERVAL_SECONDS }
    }
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<MonitorStore>,
    checker: Arc<dyn Checker>,
    alerts: Arc<AlertDispatcher>,
    history: Option<Arc<dyn Database>>,
    settings: SchedulerSettings,
    timers: Mutex<HashMap<MonitorId, Timer>>,
    next_generation: AtomicU64,
}

/// Cheap to clone; clones share timers
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<MonitorStore>,
        checker: Arc<dyn Checker>,
        alerts: Arc<AlertDispatcher>,
        settings: SchedulerSettings,
    ) -> Self {
        Self::build(store, checker, alerts, settings, None)
    }

    /// Scheduler that also appends every executed check to `history`
    pub fn with_history(
        store: Arc<MonitorStore>,
        checker: Arc<dyn Checker>,
        alerts: Arc<AlertDispatcher>,
        settings: SchedulerSettings,
        history: Arc<dyn Database>,
    ) -> Self {
        Self::build(store, checker, alerts, settings, Some(history))
    }

    fn build(
        store: Arc<MonitorStore>,
        checker: Arc<dyn Checker>,
        alerts: Arc<AlertDispatcher>,
        settings: SchedulerSettings,
        history: Option<Arc<dyn Database>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                checker,
                alerts,
                history,
                settings,
                timers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn min_interval_seconds(&self) -> u64 {
        self.inner.settings.min_interval_seconds.max(MIN_INTERVAL_SECONDS)
    }

    /// Validate, store and arm a new monitor
    pub async fn add(&self, new: NewMonitor) -> Result<Monitor, SchedulerError> {
        let name = validation::validate_name(&new.name)?;
        let url = validation::validate_url(&new.url)?;
        let interval = validation::validate_interval(new.interval_seconds, self.min_interval_seconds())?;
        let monitor = Monitor::new(new.user_id, name, url, interval);

        let mut timers = self.inner.timers.lock().await;
        self.inner.store.upsert(monitor.clone()).await;
        self.arm(&mut timers, monitor.id, monitor.interval());

        info!(monitor = %monitor.id, url = %monitor.url, interval = interval, "Monitor added");
        Ok(monitor)
    }

    /// Disarm and delete. Removing an unknown id succeeds.
    pub async fn remove(&self, id: MonitorId) -> Result<(), SchedulerError> {
        let mut timers = self.inner.timers.lock().await;
        disarm(&mut timers, id);

        match self.inner.store.delete(id).await {
            Ok(_) => info!(monitor = %id, "Monitor deleted"),
            Err(StoreError::NotFound(_)) => debug!(monitor = %id, "Delete of unknown monitor ignored"),
        }
        Ok(())
    }

    pub async fn pause(&self, id: MonitorId) -> Result<Monitor, SchedulerError> {
        let mut timers = self.inner.timers.lock().await;
        let monitor = self.inner.store.update(id, |m| m.is_active = false).await?;
        disarm(&mut timers, id);

        info!(monitor = %id, "Monitor paused");
        Ok(monitor)
    }

    pub async fn resume(&self, id: MonitorId) -> Result<Monitor, SchedulerError> {
        let mut timers = self.inner.timers.lock().await;
        let monitor = self.inner.store.update(id, |m| m.is_active = true).await?;
        if !timers.contains_key(&id) {
            self.arm(&mut timers, id, monitor.interval());
        }

        info!(monitor = %id, "Monitor resumed");
        Ok(monitor)
    }

    /// Change the interval. An active monitor is re-armed, restarting its phase.
    pub async fn set_interval(
        &self,
        id: MonitorId,
        interval_seconds: u64,
    ) -> Result<Monitor, SchedulerError> {
        let interval = validation::validate_interval(interval_seconds, self.min_interval_seconds())?;

        let mut timers = self.inner.timers.lock().await;
        let monitor = self.inner.store.update(id, |m| m.interval_seconds = interval).await?;
        if monitor.is_active {
            self.arm(&mut timers, id, monitor.interval());
        }

        info!(monitor = %id, interval = interval, "Monitor interval changed");
        Ok(monitor)
    }

    /// Arm every active monitor in the store, returning how many timers were armed
    pub async fn start(&self) -> usize {
        let mut timers = self.inner.timers.lock().await;
        let mut armed = 0;
        for monitor in self.inner.store.list_active().await {
            if !timers.contains_key(&monitor.id) {
                self.arm(&mut timers, monitor.id, monitor.interval());
                armed += 1;
            }
        }

        info!("Scheduler started with {} active monitors", armed);
        armed
    }

    /// Disarm every timer. In-flight checks finish on their own.
    pub async fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().await;
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        info!("Scheduler stopped, {} timers disarmed", count);
    }

    pub async fn armed_count(&self) -> usize {
        self.inner.timers.lock().await.len()
    }

    pub async fn is_armed(&self, id: MonitorId) -> bool {
        self.inner.timers.lock().await.contains_key(&id)
    }

    /// Replace any timer for `id` with a fresh one
    fn arm(&self, timers: &mut HashMap<MonitorId, Timer>, id: MonitorId, period: Duration) {
        disarm(timers, id);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(run_timer(Arc::downgrade(&self.inner), id, period, generation));
        timers.insert(id, Timer { generation, handle });
        debug!(monitor = %id, period_secs = period.as_secs(), generation, "Timer armed");
    }
}

fn disarm(timers: &mut HashMap<MonitorId, Timer>, id: MonitorId) {
    if let Some(timer) = timers.remove(&id) {
        timer.handle.abort();
        debug!(monitor = %id, generation = timer.generation, "Timer disarmed");
    }
}

async fn run_timer(inner: Weak<Inner>, id: MonitorId, period: Duration, generation: u64) {
    // Records loaded from storage are not revalidated
    let Some(start) = Instant::now().checked_add(period) else {
        warn!(monitor = %id, period_secs = period.as_secs(), "Interval out of range, timer not started");
        if let Some(inner) = inner.upgrade() {
            inner.self_disarm(id, generation).await;
        }
        return;
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let monitor = inner.store.get(id).await;
        match monitor {
            Some(monitor) if monitor.is_active => {
                tokio::spawn(async move { inner.run_check(monitor).await });
            }
            _ => {
                inner.self_disarm(id, generation).await;
                return;
            }
        }
    }
}

impl Inner {
    async fn self_disarm(&self, id: MonitorId, generation: u64) {
        let mut timers = self.timers.lock().await;
        // A newer timer for the same id belongs to someone else
        if timers.get(&id).is_some_and(|t| t.generation == generation) {
            timers.remove(&id);
            debug!(monitor = %id, generation, "Timer disarmed itself");
        }
    }

    async fn run_check(&self, monitor: Monitor) {
        let result = self.checker.check(&monitor).await;

        let outcome = match self.store.apply_check(&result, self.settings.uptime_mode).await {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound(id)) => {
                debug!(monitor = %id, "Monitor deleted during check, result dropped");
                return;
            }
        };

        if let Some(history) = &self.history {
            if let Err(e) = history.append_log(&MonitorLog::from_check_result(&result)).await {
                warn!(monitor = %monitor.id, "Failed to record check history: {e:#}");
            }
        }

        let current = outcome.monitor.status;
        if outcome.previous != current {
            info!(
                monitor = %monitor.id,
                from = %outcome.previous,
                to = %current,
                latency_ms = result.latency_ms,
                "Monitor status changed"
            );
        }

        if outcome.is_down_transition() {
            if let Err(e) = self.alerts.dispatch_down(&outcome.monitor, &result.detail).await {
                warn!(monitor = %monitor.id, "Downtime alert not delivered: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::database::models::User;
    use crate::monitoring::alerts::testing::{RecordingTransport, StaticUsers, user};
    use crate::monitoring::types::{CheckResult, MonitorStatus};

    /// Checker that replays a per-monitor script, then keeps returning `fallback`
    struct ScriptedChecker {
        scripts: StdMutex<HashMap<MonitorId, VecDeque<MonitorStatus>>>,
        fallback: MonitorStatus,
        calls: AtomicUsize,
    }

    impl ScriptedChecker {
        fn always(fallback: MonitorStatus) -> Self {
            Self { scripts: StdMutex::new(HashMap::new()), fallback, calls: AtomicUsize::new(0) }
        }

        fn script(&self, id: MonitorId, statuses: &[MonitorStatus]) {
            self.scripts.lock().unwrap().insert(id, statuses.iter().copied().collect());
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Checker for ScriptedChecker {
        async fn check(&self, monitor: &Monitor) -> CheckResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&monitor.id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(self.fallback);

            match status {
                MonitorStatus::Up => CheckResult::up(monitor, 25, "200 OK"),
                _ => CheckResult::failure(monitor, "connection refused"),
            }
        }
    }

    /// Checker that blocks until the test hands out a permit
    struct GatedChecker {
        gate: Semaphore,
        started: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Checker for GatedChecker {
        async fn check(&self, monitor: &Monitor) -> CheckResult {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            CheckResult::failure(monitor, "connection refused")
        }
    }

    /// Checker whose latency is random but always below the interval
    struct SlowChecker {
        rng: StdMutex<StdRng>,
        calls: StdMutex<HashMap<MonitorId, usize>>,
    }

    #[async_trait::async_trait]
    impl Checker for SlowChecker {
        async fn check(&self, monitor: &Monitor) -> CheckResult {
            *self.calls.lock().unwrap().entry(monitor.id).or_default() += 1;
            let latency = self.rng.lock().unwrap().gen_range(0..monitor.interval_seconds * 1000);
            tokio::time::sleep(Duration::from_millis(latency)).await;
            CheckResult::up(monitor, latency, "200 OK")
        }
    }

    struct Harness {
        scheduler: Scheduler,
        store: Arc<MonitorStore>,
        transport: Arc<RecordingTransport>,
        owner: User,
    }

    fn harness(checker: Arc<dyn Checker>) -> Harness {
        let store = Arc::new(MonitorStore::new());
        let users = Arc::new(StaticUsers::default());
        let owner = user("100");
        users.insert(owner.clone());
        let transport = Arc::new(RecordingTransport::default());
        let alerts = Arc::new(AlertDispatcher::new(users, transport.clone()));
        let scheduler = Scheduler::new(store.clone(), checker, alerts, SchedulerSettings::default());
        Harness { scheduler, store, transport, owner }
    }

    fn new_monitor(owner: &User, interval_seconds: u64) -> NewMonitor {
        NewMonitor {
            user_id: owner.id,
            name: "api".to_string(),
            url: "http://127.0.0.1:9/health".to_string(),
            interval_seconds,
        }
    }

    async fn sleep_secs(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    async fn assert_timers_match_active(h: &Harness, ids: &[MonitorId]) {
        for id in ids {
            let active = h.store.get(*id).await.is_some_and(|m| m.is_active);
            assert_eq!(h.scheduler.is_armed(*id).await, active, "timer state of {id}");
        }
        assert_eq!(h.scheduler.armed_count().await, h.store.list_active().await.len());
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_fires_one_full_period_after_add() {
        let checker = Arc::new(ScriptedChecker::always(MonitorStatus::Up));
        let h = harness(checker.clone());
        h.scheduler.add(new_monitor(&h.owner, 30)).await.unwrap();

        sleep_secs(0.5).await;
        assert_eq!(checker.calls(), 0);
        sleep_secs(29.0).await;
        assert_eq!(checker.calls(), 0);
        sleep_secs(0.6).await;
        assert_eq!(checker.calls(), 1);
        sleep_secs(30.0).await;
        assert_eq!(checker.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_target_goes_down_and_alerts_once() {
        let h = harness(Arc::new(ScriptedChecker::always(MonitorStatus::Down)));
        let monitor = h.scheduler.add(new_monitor(&h.owner, 10)).await.unwrap();

        sleep_secs(10.001).await;
        let stored = h.store.get(monitor.id).await.unwrap();
        assert_eq!(stored.status, MonitorStatus::Down);
        assert_eq!(stored.last_response_time_ms, Some(10_000));
        assert_eq!(stored.uptime_percentage, 0.0);
        assert_eq!(h.transport.count(), 1);
        assert_eq!(h.transport.sent.lock().unwrap()[0].0, "100");

        // Staying down does not alert again
        sleep_secs(30.0).await;
        assert_eq!(h.transport.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn alerts_only_on_the_transition_to_down() {
        let checker = Arc::new(ScriptedChecker::always(MonitorStatus::Up));
        let h = harness(checker.clone());
        let monitor = h.scheduler.add(new_monitor(&h.owner, 10)).await.unwrap();
        checker.script(
            monitor.id,
            &[MonitorStatus::Up, MonitorStatus::Down, MonitorStatus::Down, MonitorStatus::Up],
        );

        sleep_secs(40.001).await;
        assert_eq!(checker.calls(), 4);
        assert_eq!(h.transport.count(), 1);

        let stored = h.store.get(monitor.id).await.unwrap();
        assert_eq!(stored.status, MonitorStatus::Up);
        // 100 -> 100 -> 0 -> 0 -> 10: a perfect record reads as never checked
        assert_eq!(stored.uptime_percentage, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn muted_owner_gets_no_alert() {
        let store = Arc::new(MonitorStore::new());
        let users = Arc::new(StaticUsers::default());
        let mut owner = user("7");
        owner.notifications_enabled = false;
        users.insert(owner.clone());
        let transport = Arc::new(RecordingTransport::default());
        let alerts = Arc::new(AlertDispatcher::new(users, transport.clone()));
        let checker = Arc::new(ScriptedChecker::always(MonitorStatus::Down));
        let scheduler = Scheduler::new(store, checker, alerts, SchedulerSettings::default());

        scheduler.add(new_monitor(&owner, 10)).await.unwrap();
        sleep_secs(10.001).await;
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_during_in_flight_check_does_not_resurrect() {
        let checker = Arc::new(GatedChecker { gate: Semaphore::new(0), started: AtomicUsize::new(0) });
        let h = harness(checker.clone());
        let monitor = h.scheduler.add(new_monitor(&h.owner, 10)).await.unwrap();

        sleep_secs(10.001).await;
        assert_eq!(checker.started.load(Ordering::SeqCst), 1);

        h.scheduler.remove(monitor.id).await.unwrap();
        assert!(!h.scheduler.is_armed(monitor.id).await);

        checker.gate.add_permits(10);
        sleep_secs(0.01).await;

        assert_eq!(h.store.get(monitor.id).await, None);
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.transport.count(), 0);

        sleep_secs(60.0).await;
        assert_eq!(checker.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_resume_and_interval_changes() {
        let checker = Arc::new(ScriptedChecker::always(MonitorStatus::Up));
        let h = harness(checker.clone());
        let monitor = h.scheduler.add(new_monitor(&h.owner, 10)).await.unwrap();

        let paused = h.scheduler.pause(monitor.id).await.unwrap();
        assert!(!paused.is_active);
        h.scheduler.pause(monitor.id).await.unwrap();
        assert_eq!(h.scheduler.armed_count().await, 0);
        sleep_secs(25.0).await;
        assert_eq!(checker.calls(), 0);

        h.scheduler.resume(monitor.id).await.unwrap();
        h.scheduler.resume(monitor.id).await.unwrap();
        assert_eq!(h.scheduler.armed_count().await, 1);
        sleep_secs(10.001).await;
        assert_eq!(checker.calls(), 1);

        // Phase restarts from the change
        sleep_secs(5.0).await;
        let updated = h.scheduler.set_interval(monitor.id, 60).await.unwrap();
        assert_eq!(updated.interval_seconds, 60);
        sleep_secs(59.0).await;
        assert_eq!(checker.calls(), 1);
        sleep_secs(1.01).await;
        assert_eq!(checker.calls(), 2);

        // Paused monitors keep their new interval but stay disarmed
        h.scheduler.pause(monitor.id).await.unwrap();
        h.scheduler.set_interval(monitor.id, 20).await.unwrap();
        assert!(!h.scheduler.is_armed(monitor.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_invalid_input_and_unknown_ids() {
        let h = harness(Arc::new(ScriptedChecker::always(MonitorStatus::Up)));

        let mut bad = new_monitor(&h.owner, 10);
        bad.url = "ftp://example.com".to_string();
        assert_eq!(
            h.scheduler.add(bad).await.unwrap_err(),
            SchedulerError::Validation(ValidationError::InvalidScheme)
        );
        assert!(matches!(
            h.scheduler.add(new_monitor(&h.owner, 5)).await,
            Err(SchedulerError::Validation(ValidationError::IntervalTooShort { got: 5, min: 10 }))
        ));
        assert_eq!(h.store.len().await, 0);

        let unknown = uuid::Uuid::new_v4();
        assert!(h.scheduler.remove(unknown).await.is_ok());
        assert_eq!(
            h.scheduler.pause(unknown).await.unwrap_err(),
            SchedulerError::Store(StoreError::NotFound(unknown))
        );
        assert!(h.scheduler.resume(unknown).await.is_err());
        assert!(h.scheduler.set_interval(unknown, 30).await.is_err());

        let monitor = h.scheduler.add(new_monitor(&h.owner, 10)).await.unwrap();
        assert!(matches!(
            h.scheduler.set_interval(monitor.id, 9).await,
            Err(SchedulerError::Validation(_))
        ));
        assert_eq!(h.store.get(monitor.id).await.unwrap().interval_seconds, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_intervals_never_leave_a_dead_timer() {
        let checker = Arc::new(ScriptedChecker::always(MonitorStatus::Up));
        let h = harness(checker.clone());

        assert!(matches!(
            h.scheduler.add(new_monitor(&h.owner, u64::MAX)).await,
            Err(SchedulerError::Validation(ValidationError::IntervalTooLong { .. }))
        ));
        assert_eq!(h.scheduler.armed_count().await, 0);

        let monitor = h.scheduler.add(new_monitor(&h.owner, 10)).await.unwrap();
        assert!(matches!(
            h.scheduler.set_interval(monitor.id, u64::MAX).await,
            Err(SchedulerError::Validation(ValidationError::IntervalTooLong { .. }))
        ));
        sleep_secs(10.001).await;
        assert!(h.scheduler.is_armed(monitor.id).await);
        assert_eq!(checker.calls(), 1);

        // A stored record that bypassed validation is disarmed, not left armed
        let stored = Monitor::new(h.owner.id, "far".into(), "https://far.test".into(), u64::MAX);
        h.store.upsert(stored.clone()).await;
        h.scheduler.start().await;
        sleep_secs(1.0).await;
        assert!(!h.scheduler.is_armed(stored.id).await);
        assert!(h.scheduler.is_armed(monitor.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn start_arms_hydrated_monitors_and_shutdown_disarms() {
        let checker = Arc::new(ScriptedChecker::always(MonitorStatus::Up));
        let h = harness(checker.clone());
        let active = Monitor::new(h.owner.id, "a".into(), "https://a.test".into(), 10);
        let mut paused = Monitor::new(h.owner.id, "b".into(), "https://b.test".into(), 10);
        paused.is_active = false;
        h.store.upsert(active.clone()).await;
        h.store.upsert(paused.clone()).await;

        assert_eq!(h.scheduler.start().await, 1);
        assert_eq!(h.scheduler.start().await, 0);
        assert!(h.scheduler.is_armed(active.id).await);
        assert!(!h.scheduler.is_armed(paused.id).await);

        sleep_secs(10.001).await;
        assert_eq!(checker.calls(), 1);

        h.scheduler.shutdown().await;
        assert_eq!(h.scheduler.armed_count().await, 0);
        sleep_secs(60.0).await;
        assert_eq!(checker.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn records_history_when_configured() {
        let (_dir, database) = crate::database::test_database().await;
        let owner = user("100");
        database.insert_user(&owner).await.unwrap();

        let store = Arc::new(MonitorStore::with_backend(database.clone()));
        let users = Arc::new(StaticUsers::default());
        users.insert(owner.clone());
        let alerts = Arc::new(AlertDispatcher::new(users, Arc::new(RecordingTransport::default())));
        let scheduler = Scheduler::with_history(
            store,
            Arc::new(ScriptedChecker::always(MonitorStatus::Up)),
            alerts,
            SchedulerSettings::default(),
            database.clone(),
        );

        let monitor = scheduler.add(new_monitor(&owner, 10)).await.unwrap();
        sleep_secs(10.001).await;
        scheduler.shutdown().await;

        let logs = database.recent_logs(monitor.id, 10).await.unwrap();
        assert!(!logs.is_empty());
        assert_eq!(logs[0].status, MonitorStatus::Up);
        assert_eq!(logs[0].detail.as_deref(), Some("200 OK"));

        let persisted = database.list_monitors().await.unwrap();
        assert_eq!(persisted[0].status, MonitorStatus::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn random_operations_keep_one_timer_per_active_monitor() {
        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let h = harness(Arc::new(ScriptedChecker::always(MonitorStatus::Up)));
            let mut ids: Vec<MonitorId> = Vec::new();

            for _ in 0..150 {
                let target = if ids.is_empty() || rng.gen_bool(0.1) {
                    uuid::Uuid::new_v4()
                } else {
                    ids[rng.gen_range(0..ids.len())]
                };

                match rng.gen_range(0..6) {
                    0 => {
                        let interval = rng.gen_range(10..40);
                        ids.push(h.scheduler.add(new_monitor(&h.owner, interval)).await.unwrap().id);
                    }
                    1 => {
                        h.scheduler.remove(target).await.unwrap();
                    }
                    2 => {
                        let _ = h.scheduler.pause(target).await;
                    }
                    3 => {
                        let _ = h.scheduler.resume(target).await;
                    }
                    4 => {
                        let _ = h.scheduler.set_interval(target, rng.gen_range(10..40)).await;
                    }
                    _ => sleep_secs(rng.gen_range(0.0..25.0)).await,
                }

                assert_timers_match_active(&h, &ids).await;
            }
            h.scheduler.shutdown().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_checks_do_not_drift_the_cadence() {
        let checker = Arc::new(SlowChecker {
            rng: StdMutex::new(StdRng::seed_from_u64(42)),
            calls: StdMutex::new(HashMap::new()),
        });
        let h = harness(checker.clone());

        let mut rng = StdRng::seed_from_u64(7);
        let mut monitors = Vec::new();
        for _ in 0..100 {
            let interval = rng.gen_range(10..=60);
            monitors.push(h.scheduler.add(new_monitor(&h.owner, interval)).await.unwrap());
        }

        let horizon = 600;
        sleep_secs(horizon as f64 + 0.001).await;

        let calls = checker.calls.lock().unwrap();
        for monitor in &monitors {
            let expected = (horizon / monitor.interval_seconds) as usize;
            let actual = calls.get(&monitor.id).copied().unwrap_or_default();
            assert!(
                actual + 1 >= expected && actual <= expected,
                "interval {}: expected {expected} checks, got {actual}",
                monitor.interval_seconds
            );
        }
    }
}
