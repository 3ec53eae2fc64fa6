//! Core domain types for Ballast.
//!
//! This crate contains the pure data model of the governance layer:
//! failure modes and their degradation actions, metric samples and
//! percentile stats, latency budgets, and rate-limit settings.
//! No IO, no async - everything here is constructible in a unit test
//! without a runtime.

mod budget;
mod failure;
mod metrics;

pub use budget::{Budget, BudgetTable, RateLimitSettings, RateLimitsError};
pub use failure::{ChannelClass, DegradationAction, FailureMode};
pub use metrics::{MetricSample, MetricStats, ResourceLimits, ResourceSnapshot};
