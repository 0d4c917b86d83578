//! Monitoring engine: the monitor store, the HTTP checker, the uptime
//! estimate, per-monitor scheduling and downtime alerts.

pub mod alerts;
pub mod checker;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod uptime;
pub mod validation;

pub use alerts::AlertDispatcher;
pub use checker::HttpChecker;
pub use scheduler::{Scheduler, SchedulerSettings};
pub use store::MonitorStore;
