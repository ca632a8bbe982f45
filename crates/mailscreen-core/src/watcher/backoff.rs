//! Exponential backoff with jitter for reconnect attempts.

use std::time::Duration;

use rand::Rng;

/// Reconnect delay policy: seed delay, doubling, capped, with jitter.
#[derive(Debug)]
pub struct ExponentialBackoff {
    seed: Duration,
    cap: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Creates a policy with the given seed and cap.
    #[must_use]
    pub const fn new(seed: Duration, cap: Duration) -> Self {
        Self {
            seed,
            cap,
            attempt: 0,
        }
    }

    /// Returns the next delay and advances the attempt counter.
    ///
    /// The delay is half the deterministic value plus a random share of the
    /// other half, so simultaneous reconnects across accounts spread out.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.seed.saturating_mul(1u32 << self.attempt.min(16));
        let capped = exp.min(self.cap);
        self.attempt = self.attempt.saturating_add(1);

        let half = capped / 2;
        let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis().max(1));
        half + Duration::from_millis(u64::try_from(jitter_ms).unwrap_or(u64::MAX))
    }

    /// Resets after a successful connect-and-authenticate cycle.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of attempts since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(60))
    }
}
