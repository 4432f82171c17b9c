//! Retry spacing: exponential, jittered, capped.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff parameters.
///
/// The delay before retry round `n` (0-based) is `base * 2^n`, capped at
/// `max`. With jitter the actual delay is drawn uniformly from
/// `[delay / 2, delay]`, so concurrent schedulers spread out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 300_000,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay without jitter for retry round `attempt`.
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }

    /// Delay for retry round `attempt`, jittered when enabled.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Like [`Backoff::delay`] but with a caller-supplied RNG.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter {
            return ceiling;
        }
        let ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        if ms < 2 {
            return ceiling;
        }
        Duration::from_millis(rng.gen_range(ms / 2..=ms))
    }
}
