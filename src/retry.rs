//! Backoff strategies for retrying fallible operations against the engine.

use rand::random;
use std::time::Duration;

/// Logic used to determine how long to wait between retry attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Strategy {
    /// Wait the same amount of time between each retry.
    Every(Duration),
    /// Exponential backoff, where the delay (approximately) doubles each attempt.
    Backoff(ExponentialBackoff),
}

impl Strategy {
    pub fn retry_in(&self, last_wait: Option<Duration>) -> Duration {
        match self {
            Self::Every(t) => *t,
            Self::Backoff(exp) => exp.retry_in(last_wait),
        }
    }
}

/// Exponential backoff waiting strategy.
///
/// Each attempt waits for twice the last delay plus/minus a random jitter,
/// clamped to `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialBackoff {
    pub min: Duration,
    pub max: Duration,
    /// Uniform random jitter applied to generated wait times. `0.1` means +/-10%.
    pub jitter: f32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(250),
            max: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn retry_in(&self, last_wait: Option<Duration>) -> Duration {
        let attempt = last_wait.map_or(self.min, |t| 2 * t);
        let perturb = (1.0 - (self.jitter * 2.0 * (random::<f32>() - 1.0))).clamp(0.0, 2.0);
        let mut target = attempt.mul_f32(perturb);

        let safe_max = if self.max < self.min { self.min } else { self.max };
        target = target.clamp(self.min, safe_max);

        target
    }
}
