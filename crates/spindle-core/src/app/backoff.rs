//! Poll backoff: decides how long to wait after a failed poll.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::ConfigError;

/// Backoff applied between consecutive failed polls.
///
/// delay = min(base_delay * multiplier^(failures - 1), max_delay), then
/// spread by ±`jitter` (a fraction of the delay) so that many workers do
/// not hammer a recovering service in lockstep. `max_delay` bounds the
/// jittered value too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollBackoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// 0.0 = no jitter, 0.2 = ±20%.
    pub jitter: f64,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl PollBackoff {
    pub const DEFAULT: Self = Self {
        base_delay: Duration::from_millis(100),
        multiplier: 2.0,
        max_delay: Duration::from_secs(30),
        jitter: 0.2,
    };

    /// Backoff without jitter, mostly for tests.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Delay before the next poll after `consecutive_failures` failures in a row.
    ///
    /// `consecutive_failures` is 1-indexed; 0 is treated as 1.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// [`delay_for`](Self::delay_for) spread by the configured jitter, never
    /// above `max_delay`.
    pub fn jittered_delay_for<R: Rng>(&self, consecutive_failures: u32, rng: &mut R) -> Duration {
        let delay = self.delay_for(consecutive_failures);
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        let secs = (delay.as_secs_f64() * factor.max(0.0)).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.multiplier < 1.0 || self.multiplier.is_nan() {
            return Err(ConfigError::InvalidValue {
                key: "poll_backoff.multiplier",
                message: "must be >= 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::InvalidValue {
                key: "poll_backoff.jitter",
                message: "must be within 0.0..=1.0".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::InvalidValue {
                key: "poll_backoff.base_delay",
                message: "must not exceed max_delay".to_string(),
            });
        }
        Ok(())
    }
}
