//! Latency budgets and rate-limit settings.
//!
//! These types guarantee usable configurations by construction: a
//! `RateLimitSettings` cannot exist with a zero request cap or a base
//! delay above its own ceiling.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// A configured latency ceiling for one named operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub threshold: Duration,
}

impl Budget {
    #[must_use]
    pub const fn from_millis(threshold_ms: u64) -> Self {
        Self {
            threshold: Duration::from_millis(threshold_ms),
        }
    }
}

/// Static map from metric name to its budget, loaded once at startup.
///
/// Lookups on unconfigured names return `None`; callers treat that as
/// "never exceeded" (fail open on missing config, not fail closed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetTable {
    entries: BTreeMap<String, Budget>,
}

impl BudgetTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, budget: Budget) {
        self.entries.insert(name.into(), budget);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Budget> {
        self.entries.get(name).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<(String, Budget)> for BudgetTable {
    fn from_iter<I: IntoIterator<Item = (String, Budget)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RateLimitsError {
    #[error("max_requests must be at least 1")]
    ZeroMaxRequests,
    #[error("base delay ({base_ms}ms) must not exceed max delay ({max_ms}ms)")]
    DelayOrdering { base_ms: u64, max_ms: u64 },
}

/// Sliding-window admission settings for one gated channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    max_requests: usize,
    window: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RateLimitSettings {
    pub fn new(
        max_requests: usize,
        window: Duration,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, RateLimitsError> {
        if max_requests == 0 {
            return Err(RateLimitsError::ZeroMaxRequests);
        }
        if base_delay > max_delay {
            return Err(RateLimitsError::DelayOrdering {
                base_ms: base_delay.as_millis() as u64,
                max_ms: max_delay.as_millis() as u64,
            });
        }
        Ok(Self {
            max_requests,
            window,
            base_delay,
            max_delay,
        })
    }

    #[must_use]
    pub const fn max_requests(&self) -> usize {
        self.max_requests
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Exponential backoff delay for the given consecutive-failure count,
    /// capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        // 2^failures saturates well before the cap matters; clamp the
        // exponent so the multiply cannot overflow.
        let exponent = consecutive_failures.min(32);
        let multiplier = 2u64.saturating_pow(exponent);
        self.base_delay
            .saturating_mul(u32::try_from(multiplier).unwrap_or(u32::MAX))
            .min(self.max_delay)
    }
}
