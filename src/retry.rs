use std::time::Duration;

/// Default number of sink attempts per message
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit; the delay after failed attempt `i` is `i` units
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    /// Delay to wait after a failed `attempt` (1-indexed) before the next one
    ///
    /// Returns `None` when `attempt` was the last one allowed.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff_unit.saturating_mul(attempt))
    }

    /// Total time spent sleeping when every attempt fails, saturating at `Duration::MAX`
    pub fn total_backoff(&self) -> Duration {
        // 1 + 2 + ... + (max_attempts - 1) units
        let last = u64::from(self.max_attempts.saturating_sub(1));
        let units = last * (last + 1) / 2;
        match u32::try_from(units) {
            Ok(units) => self.backoff_unit.saturating_mul(units),
            Err(_) => Duration::MAX,
        }
    }
}
