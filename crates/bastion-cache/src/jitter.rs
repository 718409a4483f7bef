//! TTL jitter.
//!
//! Entries written at the same moment with the same base TTL would expire
//! together. Every write therefore gets `base + U[0, base * percent / 100) +
//! U[0, noise)`.

use bastion_config::CacheConfig;
use rand::Rng;
use std::time::Duration;

/// Smallest TTL ever written.
pub const MIN_TTL: Duration = Duration::from_secs(1);

/// Computes effective TTLs from base TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    enabled: bool,
    percent: u32,
    noise: Duration,
}

impl TtlPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(enabled: bool, percent: u32, noise: Duration) -> Self {
        Self { enabled, percent, noise }
    }

    /// A policy that returns the base TTL unchanged.
    #[must_use]
    pub const fn fixed() -> Self {
        Self::new(false, 0, Duration::ZERO)
    }

    /// Builds the policy from cache configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enable_jitter, config.jitter_percent, config.jitter_noise())
    }

    /// Exclusive upper bound of the jitter added to `base`.
    #[must_use]
    pub fn max_extra(&self, base: Duration) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        base * self.percent / 100 + self.noise
    }

    /// Returns the TTL to write for an entry with the given base TTL.
    ///
    /// The result is always in `[max(base, MIN_TTL), max(base, MIN_TTL) + max_extra)`.
    #[must_use]
    pub fn apply(&self, base: Duration) -> Duration {
        let base = base.max(MIN_TTL);
        let extra_ms = u64::try_from(self.max_extra(base).as_millis()).unwrap_or(u64::MAX);
        if extra_ms == 0 {
            return base;
        }

        base + Duration::from_millis(rand::thread_rng().gen_range(0..extra_ms))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_envelope() {
        let policy = TtlPolicy::default();
        let base = Duration::from_secs(300);
        // 20% of 300s plus 30s noise
        let ceiling = base + Duration::from_secs(90);

        for _ in 0..1_000 {
            let ttl = policy.apply(base);
            assert!(ttl >= base, "{ttl:?} below base");
            assert!(ttl < ceiling, "{ttl:?} above envelope");
        }
    }

    #[test]
    fn test_zero_base_is_raised() {
        let policy = TtlPolicy::default();
        for _ in 0..100 {
            assert!(policy.apply(Duration::ZERO) >= MIN_TTL);
        }
        assert_eq!(TtlPolicy::fixed().apply(Duration::ZERO), MIN_TTL);
    }

    #[test]
    fn test_disabled_jitter_returns_base() {
        let policy = TtlPolicy::new(false, 20, Duration::from_secs(30));
        assert_eq!(policy.apply(Duration::from_secs(60)), Duration::from_secs(60));
        assert_eq!(policy.max_extra(Duration::from_secs(60)), Duration::ZERO);
    }

    #[test]
    fn test_jitter_spreads_values() {
        let policy = TtlPolicy::default();
        let base = Duration::from_secs(300);
        let first = policy.apply(base);
        assert!((0..50).any(|_| policy.apply(base) != first));
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            jitter_percent: 10,
            jitter_noise_secs: 0,
            ..Default::default()
        };
        let policy = TtlPolicy::from_config(&config);
        assert_eq!(policy.max_extra(Duration::from_secs(100)), Duration::from_secs(10));
    }
}
