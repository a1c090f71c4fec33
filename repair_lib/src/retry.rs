use std::time::Duration;

/// How often a failed read is attempted again before the error is reported.
///
/// Delays double from `base_delay` per attempt and are capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// single attempt, failures go straight to the caller
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    /// delay before retry number `retry` (starting at 1)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.max(1) - 1;
        let factor = 1_u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn allows_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}
