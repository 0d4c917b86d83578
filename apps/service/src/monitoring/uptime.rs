//! Rolling uptime estimate.
//!
//! The stored percentage is an exponentially weighted moving average with
//! weight 0.1 toward 100 (up) or 0 (down). It is an estimate, not a measured
//! availability ratio.

use serde::{Deserialize, Serialize};

use super::types::MonitorStatus;

/// Value a fresh monitor starts with. [`next_uptime`] also reads it as "never checked".
pub const NEVER_CHECKED: f64 = 100.0;

const DECAY: f64 = 0.9;
const STEP: f64 = 10.0;

/// How the first check of a monitor is recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UptimeMode {
    /// `uptime == 100.0` means "never checked". A monitor that has been up on
    /// every check is reset on each tick, which is harmless because it stays at 100.
    #[default]
    Sentinel,
    /// Use the monitor's `has_been_checked` flag instead of the sentinel value.
    Tracked,
}

impl UptimeMode {
    pub fn next(self, prev: f64, status: MonitorStatus, has_been_checked: bool) -> f64 {
        match self {
            UptimeMode::Sentinel => next_uptime(prev, status),
            UptimeMode::Tracked => advance(prev, status, !has_been_checked),
        }
    }
}

/// New uptime percentage after a check, treating 100.0 as "never checked"
pub fn next_uptime(prev: f64, status: MonitorStatus) -> f64 {
    advance(prev, status, prev == NEVER_CHECKED)
}

fn advance(prev: f64, status: MonitorStatus, first_check: bool) -> f64 {
    let up = status == MonitorStatus::Up;
    let next = match (first_check, up) {
        (true, true) => 100.0,
        (true, false) => 0.0,
        (false, true) => prev * DECAY + STEP,
        (false, false) => prev * DECAY,
    };
    next.clamp(0.0, 100.0)
}
