//! Capped exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`BackoffPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay for attempt 0, in milliseconds.
    pub base_ms: u64,
    /// Multiplier applied per attempt.
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Upper bound on any computed delay, in milliseconds.
    pub cap_ms: u64,
}

fn default_factor() -> f64 {
    2.0
}

impl BackoffConfig {
    /// Reconnect schedule: 3s growing ×1.5 up to 2 minutes.
    pub fn reconnect() -> Self {
        Self {
            base_ms: 3_000,
            factor: 1.5,
            cap_ms: 120_000,
        }
    }

    /// Sink delivery schedule: 1s doubling up to 1 minute.
    pub fn delivery() -> Self {
        Self {
            base_ms: 1_000,
            factor: 2.0,
            cap_ms: 60_000,
        }
    }
}

/// Stateless backoff policy: maps an attempt number to a wait.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    factor: f64,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(config: &BackoffConfig) -> Self {
        // factor < 1 would make the schedule shrink; clamp so delays never decrease.
        let factor = if config.factor.is_finite() && config.factor >= 1.0 {
            config.factor
        } else {
            1.0
        };
        Self {
            base: Duration::from_millis(config.base_ms),
            factor,
            cap: Duration::from_millis(config.cap_ms.max(config.base_ms)),
        }
    }

    /// Returns `base * factor^attempt`, capped at `cap`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = self.base.as_millis() as f64 * self.factor.powi(exp);
        let cap_ms = self.cap.as_millis() as f64;
        if !ms.is_finite() || ms >= cap_ms {
            return self.cap;
        }
        Duration::from_millis(ms as u64)
    }

    /// The floor of the schedule (`delay(0)`).
    pub fn base(&self) -> Duration {
        self.base.min(self.cap)
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(&BackoffConfig::reconnect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, factor: f64, cap_ms: u64) -> BackoffPolicy {
        BackoffPolicy::new(&BackoffConfig {
            base_ms,
            factor,
            cap_ms,
        })
    }

    #[test]
    fn reconnect_schedule() {
        let p = BackoffPolicy::new(&BackoffConfig::reconnect());
        assert_eq!(p.delay(0), Duration::from_millis(3_000));
        assert_eq!(p.delay(1), Duration::from_millis(4_500));
        assert_eq!(p.delay(2), Duration::from_millis(6_750));
        assert_eq!(p.delay(19), Duration::from_secs(120));
    }

    #[test]
    fn delay_is_monotonic_and_capped() {
        let p = policy(250, 1.7, 45_000);
        let mut prev = Duration::ZERO;
        for attempt in 0..200 {
            let d = p.delay(attempt);
            assert!(d >= prev, "delay({attempt}) = {d:?} < {prev:?}");
            assert!(d <= Duration::from_millis(45_000));
            prev = d;
        }
    }

    #[test]
    fn huge_attempt_saturates_to_cap() {
        let p = policy(1_000, 2.0, 60_000);
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn shrinking_factor_is_clamped() {
        let p = policy(500, 0.5, 10_000);
        assert_eq!(p.delay(0), Duration::from_millis(500));
        assert_eq!(p.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn cap_below_base_uses_base() {
        let p = policy(5_000, 2.0, 1_000);
        assert_eq!(p.delay(0), Duration::from_millis(5_000));
        assert_eq!(p.cap(), Duration::from_millis(5_000));
    }
}
