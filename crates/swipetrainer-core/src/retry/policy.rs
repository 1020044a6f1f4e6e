use std::time::Duration;

/// Exponential backoff schedule for transient image-fetch failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per URL, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Symmetric jitter as a fraction of the delay (0.0..=1.0).
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn single_attempt() -> Self {
        Self::with_attempts(1)
    }

    /// `max_attempts` attempts with the image-download backoff schedule.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_ratio: 0.20,
        }
    }

    /// Delay before retry number `retry_index` (1-based).
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let shift = retry_index.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Spread `delay` uniformly over `delay * (1 ± jitter_ratio)`.
    pub fn with_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let millis = delay.as_millis() as f64;
        let spread = millis * self.jitter_ratio.clamp(0.0, 1.0);
        let low = (millis - spread).max(0.0);
        let high = millis + spread;
        if high <= low {
            return Duration::from_millis(low.round() as u64);
        }
        let sampled = rand::random::<f64>() * (high - low) + low;
        Duration::from_millis(sampled.round() as u64)
    }
}
