//! Input validation for monitor fields.
//!
//! Everything here runs before a command reaches the scheduler, so a
//! monitor that fails validation is never stored.

use thiserror::Error;
use url::Url;

/// Shortest check interval the engine accepts
pub const MIN_INTERVAL_SECONDS: u64 = 10;

/// Longest check interval the engine accepts (30 days)
pub const MAX_INTERVAL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Longest display name accepted for a monitor
pub const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("URL must start with http:// or https://")]
    InvalidScheme,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL must have a valid host")]
    MissingHost,

    #[error("Check interval too short: {got} seconds (minimum: {min})")]
    IntervalTooShort { got: u64, min: u64 },

    #[error("Check interval too long: {got} seconds (maximum: {max})")]
    IntervalTooLong { got: u64, max: u64 },

    #[error("Check interval is not a whole number of seconds: {0:?}")]
    IntervalNotANumber(String),

    #[error("Monitor name cannot be empty")]
    EmptyName,

    #[error("Monitor name is longer than {MAX_NAME_LEN} characters")]
    NameTooLong,
}

/// Validate an HTTP/HTTPS target
pub fn validate_url(target: &str) -> Result<String, ValidationError> {
    let target = target.trim();
    if !(target.starts_with("http://") || target.starts_with("https://")) {
        return Err(ValidationError::InvalidScheme);
    }

    let url = Url::parse(target).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::MissingHost);
    }

    Ok(target.to_string())
}

/// Validate a check interval against the configured floor, which is never below
/// [`MIN_INTERVAL_SECONDS`], and against [`MAX_INTERVAL_SECONDS`]
pub fn validate_interval(interval_seconds: u64, min: u64) -> Result<u64, ValidationError> {
    let min = min.max(MIN_INTERVAL_SECONDS);
    if interval_seconds < min {
        return Err(ValidationError::IntervalTooShort { got: interval_seconds, min });
    }
    if interval_seconds > MAX_INTERVAL_SECONDS {
        return Err(ValidationError::IntervalTooLong {
            got: interval_seconds,
            max: MAX_INTERVAL_SECONDS,
        });
    }
    Ok(interval_seconds)
}

/// Parse user input as an interval in seconds and validate it
pub fn parse_interval(raw: &str, min: u64) -> Result<u64, ValidationError> {
    let seconds = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::IntervalNotANumber(raw.trim().to_string()))?;
    validate_interval(seconds, min)
}

/// Trim and validate a display name
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    Ok(name.to_string())
}
