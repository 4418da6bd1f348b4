//! Retry delay schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff: `base_delay * 2^attempt` for a 0-based attempt index.
///
/// `attempt` is the index of the attempt that just failed, so the sleep before the
/// second call uses `delay(0)`, the sleep before the third uses `delay(1)`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Jitter factor (0.0-1.0). Zero keeps the schedule exact.
    pub jitter: f64,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}

impl BackoffSchedule {
    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            base_delay,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Delay to sleep after the failed attempt with index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exact = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));

        if self.jitter <= 0.0 {
            return exact;
        }

        // Deterministic spread keyed by the attempt index.
        let exact_ms = exact.as_millis() as f64;
        let range = exact_ms * self.jitter;
        let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
        let offset = range * (pseudo_random - 0.5) * 2.0;

        Duration::from_millis((exact_ms + offset).max(0.0) as u64)
    }

    /// Total sleep performed by an executor that makes `attempts` calls which all fail.
    pub fn total_delay(&self, attempts: u32) -> Duration {
        (0..attempts.saturating_sub(1))
            .map(|n| self.delay(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
