//! Bounded exponential backoff for reconnection attempts.
//!
//! **Purpose**: the prop's BLE link drops routinely (battery props, people
//! walking through the radio path). Reconnection must be persistent but
//! bounded, so a powered-off prop does not keep a task spinning forever.

use std::time::Duration;

/// Bounded exponential backoff policy.
///
/// Produces `max_attempts` delays, starting at `initial` and doubling up
/// to `max`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Total number of retry attempts
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(8),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Iterator over the retry delays (length == `max_attempts`).
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let initial = self.initial;
        let max = self.max;
        (0..self.max_attempts).map(move |attempt| {
            let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
            initial.checked_mul(factor).map_or(max, |d| d.min(max))
        })
    }
}
