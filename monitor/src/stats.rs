//! Nearest-rank percentile over sorted durations.

use std::time::Duration;

/// Nearest-rank percentile: the smallest value with at least `pct`% of
/// the samples at or below it. `sorted` must be ascending.
///
/// Returns `Duration::ZERO` for an empty slice.
pub(crate) fn percentile(sorted: &[Duration], pct: u32) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    debug_assert!((1..=100).contains(&pct));
    let rank = (u64::from(pct) * sorted.len() as u64).div_ceil(100);
    let index = (rank.max(1) - 1) as usize;
    sorted[index.min(sorted.len() - 1)]
}
