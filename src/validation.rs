//! Validation of configuration values.

use crate::{CredwatchError, Result};
use std::time::Duration;

/// Largest accepted sampling interval (one day).
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Validates a TTL sampling interval.
///
/// # Errors
///
/// Returns [`CredwatchError::InvalidConfig`] if the interval is zero or
/// longer than [`MAX_INTERVAL`].
///
/// # Example
///
/// ```
/// use credwatch::validation::validate_interval;
/// use std::time::Duration;
///
/// assert!(validate_interval(Duration::from_secs(30)).is_ok());
/// assert!(validate_interval(Duration::ZERO).is_err());
/// ```
pub fn validate_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(CredwatchError::InvalidConfig(
            "sampling interval must be positive".to_string(),
        ));
    }

    if interval > MAX_INTERVAL {
        return Err(CredwatchError::InvalidConfig(format!(
            "sampling interval exceeds maximum of {} seconds",
            MAX_INTERVAL.as_secs()
        )));
    }

    Ok(())
}

/// Parses a whole number of seconds into an interval and validates it.
pub fn parse_interval_secs(value: &str) -> Result<Duration> {
    let secs: u64 = value.trim().parse().map_err(|_| {
        CredwatchError::InvalidConfig(format!("not a number of seconds: {:?}", value))
    })?;
    let interval = Duration::from_secs(secs);
    validate_interval(interval)?;
    Ok(interval)
}

/// Parses an on/off switch (`on`, `off`, `true`, `false`, `1`, `0`, `yes`, `no`).
pub fn parse_switch(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        other => Err(CredwatchError::InvalidConfig(format!(
            "expected on/off, got {:?}",
            other
        ))),
    }
}
