//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Exponential-backoff retry policy."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Retry count, initial delay, and maximum delay for exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt (total attempts = count + 1).
    pub count: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(count: usize, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            count,
            initial_delay,
            max_delay,
        }
    }

    /// Delay before the given retry attempt (1-indexed: the delay awaited
    /// before the 2nd overall attempt is `delay_for(1)`).
    pub fn delay_for(&self, attempt: usize, rng: &mut StdRng) -> Duration {
        let exponent = (attempt.saturating_sub(1) as u32).min(16);
        let scaled = self.initial_delay.mul_f64(2u64.pow(exponent) as f64);
        let capped = scaled.min(self.max_delay);
        let jitter_ms = rng.gen_range(0..=capped.as_millis().max(1) / 4) as u64;
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(100), Duration::from_millis(2000))
    }
}

pub(crate) fn new_rng() -> StdRng {
    StdRng::from_entropy()
}
