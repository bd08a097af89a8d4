//! Per-object exponential failure backoff with expiring counters.
//!
//! Every failure of an object doubles its delay `speed` times, starting at
//! the base delay and capped at the maximum. Counters live in a `moka` cache
//! whose entries expire 1.3 times the maximum delay after the last failure,
//! so an object that recovers and fails much later starts again from the
//! base delay and idle objects do not accumulate.

use std::fmt;
use std::time::Duration;

use moka::sync::Cache;

/// Exponential failure rate limiter keyed by object.
pub struct FailureBackoff {
    base: Duration,
    max: Duration,
    speed: u32,
    failures: Cache<String, u32>,
}

impl fmt::Debug for FailureBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureBackoff")
            .field("base", &self.base)
            .field("max", &self.max)
            .field("speed", &self.speed)
            .field("tracked", &self.failures.entry_count())
            .finish()
    }
}

impl FailureBackoff {
    /// Creates a limiter whose delay grows as `base * 2^(speed * n)` for the
    /// `n`th consecutive failure, capped at `max`.
    #[must_use]
    pub fn new(base: Duration, max: Duration, speed: u32) -> Self {
        Self {
            base,
            max,
            speed,
            failures: Cache::builder().time_to_live(expiry_for(max)).build(),
        }
    }

    /// 100ms doubling twice per failure up to 10 minutes.
    #[must_use]
    pub fn quick() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(600), 2)
    }

    /// 1s doubling twice per failure up to 10 minutes.
    #[must_use]
    pub fn slow_1s() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(600), 2)
    }

    /// 10s doubling twice per failure up to 10 minutes.
    #[must_use]
    pub fn slow_10s() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(600), 2)
    }

    /// 1m doubling once per failure up to an hour.
    #[must_use]
    pub fn ultra_slow_1m() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(3600), 1)
    }

    /// Time after the last failure at which a counter is discarded.
    #[must_use]
    pub const fn expiry(&self) -> Duration {
        expiry_for(self.max)
    }

    /// Records a failure of `key` and returns the delay before its retry.
    pub fn when(&self, key: &str) -> Duration {
        let failures = self
            .failures
            .entry_by_ref(key)
            .and_upsert_with(|previous| {
                previous.map_or(0, |entry| *entry.value()).saturating_add(1)
            })
            .into_value();
        self.delay_for(failures.saturating_sub(1))
    }

    /// Consecutive failures recorded for `key` within the expiry window.
    #[must_use]
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).unwrap_or(0)
    }

    /// Clears the counter of `key` after a successful reconciliation.
    pub fn forget(&self, key: &str) {
        self.failures.invalidate(key);
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = self.speed.saturating_mul(failures);
        let Some(factor) = 2_u32.checked_pow(exponent) else {
            return self.max;
        };
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

const fn expiry_for(max: Duration) -> Duration {
    match max.saturating_mul(13).checked_div(10) {
        Some(expiry) => expiry,
        None => max,
    }
}
