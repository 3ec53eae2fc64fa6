//! Performance monitoring for the governance layer.
//!
//! A [`PerformanceMonitor`] records timing samples into per-name bounded
//! ring buffers, keeps a separate bounded buffer of periodic resource
//! snapshots, and answers percentile and budget queries over the current
//! buffer contents.
//!
//! The monitor is an explicitly constructed instance, created once at the
//! composition root and handed to every consumer as an `Arc` - never a
//! module-level global - so unit tests get fresh, isolated instances.
//!
//! No operation here returns an error or panics; the only side effect is
//! a bounded buffer append.

mod stats;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use ballast_types::{
    BudgetTable, FailureMode, MetricSample, MetricStats, ResourceLimits, ResourceSnapshot,
};

/// Per-name sample buffer capacity. Oldest samples are evicted on
/// overflow; buffers are never unbounded.
pub const MAX_SAMPLES_PER_METRIC: usize = 256;

/// Resource snapshot buffer capacity.
pub const MAX_RESOURCE_SNAPSHOTS: usize = 120;

#[derive(Debug, Default)]
struct MonitorState {
    samples: HashMap<String, VecDeque<MetricSample>>,
    resources: VecDeque<ResourceSnapshot>,
}

/// Records timing/resource samples and evaluates them against budgets.
#[derive(Debug)]
pub struct PerformanceMonitor {
    budgets: BudgetTable,
    limits: ResourceLimits,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    #[must_use]
    pub fn new(budgets: BudgetTable, limits: ResourceLimits) -> Self {
        Self {
            budgets,
            limits,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Begin a timed span. Call [`TimingSpan::finish`] to record it;
    /// a dropped span records nothing. Concurrent spans under the same
    /// name are independent.
    #[must_use]
    pub fn start_timing(&self, name: &str) -> TimingSpan<'_> {
        TimingSpan {
            monitor: self,
            name: name.to_string(),
            started_at: SystemTime::now(),
            started: Instant::now(),
        }
    }

    /// Append a sample directly. Used by the timeout gate, which knows
    /// the effective duration without running a span to completion.
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.record_sample(MetricSample {
            name: name.to_string(),
            started_at: SystemTime::now(),
            duration,
        });
    }

    fn record_sample(&self, sample: MetricSample) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let buffer = state.samples.entry(sample.name.clone()).or_default();
        if buffer.len() >= MAX_SAMPLES_PER_METRIC {
            buffer.pop_front();
        }
        buffer.push_back(sample);
    }

    /// Append a periodic resource snapshot.
    pub fn record_resource(&self, snapshot: ResourceSnapshot) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.resources.len() >= MAX_RESOURCE_SNAPSHOTS {
            state.resources.pop_front();
        }
        state.resources.push_back(snapshot);
    }

    /// Percentile stats over the current buffer for `name`.
    ///
    /// All-zero stats when no samples exist; never an error.
    #[must_use]
    pub fn stats(&self, name: &str) -> MetricStats {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(buffer) = state.samples.get(name) else {
            return MetricStats::default();
        };
        let mut durations: Vec<Duration> = buffer.iter().map(|s| s.duration).collect();
        durations.sort_unstable();
        MetricStats {
            p50: stats::percentile(&durations, 50),
            p95: stats::percentile(&durations, 95),
            p99: stats::percentile(&durations, 99),
            count: durations.len(),
        }
    }

    /// Duration of the most recently recorded sample for `name`.
    #[must_use]
    pub fn last_duration(&self, name: &str) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .samples
            .get(name)
            .and_then(|buffer| buffer.back())
            .map(|sample| sample.duration)
    }

    /// Whether `duration` breaches the configured budget for `name`.
    ///
    /// Unconfigured names never count as exceeded.
    #[must_use]
    pub fn is_budget_exceeded(&self, name: &str, duration: Duration) -> bool {
        match self.budgets.get(name) {
            Some(budget) => duration > budget.threshold,
            None => false,
        }
    }

    /// Evaluate the most recent resource snapshot against the ceilings.
    #[must_use]
    pub fn resource_pressure(&self) -> Option<FailureMode> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let latest = state.resources.back()?;
        let mode = self.limits.pressure(latest);
        if let Some(mode) = mode {
            tracing::warn!(
                %mode,
                cpu_percent = latest.cpu_percent,
                memory_bytes = latest.memory_bytes,
                "resource ceiling breached"
            );
        }
        mode
    }

    /// The resource ceilings this monitor evaluates against.
    #[must_use]
    pub const fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

/// In-progress timed span. Recording happens in [`finish`](Self::finish).
#[derive(Debug)]
pub struct TimingSpan<'a> {
    monitor: &'a PerformanceMonitor,
    name: String,
    started_at: SystemTime,
    started: Instant,
}

impl TimingSpan<'_> {
    /// Stop the span, record one sample, and return the elapsed time.
    pub fn finish(self) -> Duration {
        let duration = self.started.elapsed();
        self.monitor.record_sample(MetricSample {
            name: self.name,
            started_at: self.started_at,
            duration,
        });
        duration
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use ballast_types::Budget;

    use super::*;

    fn monitor_with(name: &str, threshold_ms: u64) -> PerformanceMonitor {
        let mut budgets = BudgetTable::new();
        budgets.insert(name, Budget::from_millis(threshold_ms));
        PerformanceMonitor::new(budgets, ResourceLimits::default())
    }

    #[test]
    fn stats_are_zero_with_no_samples() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        let stats = monitor.stats("nothing");
        assert_eq!(stats, MetricStats::default());
    }

    #[test]
    fn timing_span_records_one_sample() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        let span = monitor.start_timing("op");
        let _ = span.finish();
        assert_eq!(monitor.stats("op").count, 1);
    }

    #[test]
    fn dropped_span_records_nothing() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        drop(monitor.start_timing("op"));
        assert_eq!(monitor.stats("op").count, 0);
    }

    #[test]
    fn concurrent_spans_are_independent() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        let first = monitor.start_timing("op");
        let second = monitor.start_timing("op");
        let _ = second.finish();
        let _ = first.finish();
        assert_eq!(monitor.stats("op").count, 2);
    }

    #[test]
    fn buffer_retains_most_recent_samples_in_order() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        let total = MAX_SAMPLES_PER_METRIC + 10;
        for i in 0..total {
            monitor.record_duration("op", Duration::from_millis(i as u64));
        }
        let stats = monitor.stats("op");
        assert_eq!(stats.count, MAX_SAMPLES_PER_METRIC);
        // Oldest entries were evicted: the smallest retained duration is
        // the first one after eviction.
        let state = monitor.state.lock().unwrap();
        let buffer = &state.samples["op"];
        assert_eq!(buffer.front().unwrap().duration, Duration::from_millis(10));
        assert_eq!(
            buffer.back().unwrap().duration,
            Duration::from_millis(total as u64 - 1)
        );
    }

    #[test]
    fn resource_buffer_is_bounded() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        for i in 0..(MAX_RESOURCE_SNAPSHOTS + 5) {
            monitor.record_resource(ResourceSnapshot::new(i as f64, 0));
        }
        let state = monitor.state.lock().unwrap();
        assert_eq!(state.resources.len(), MAX_RESOURCE_SNAPSHOTS);
    }

    #[test]
    fn budget_check_is_fail_open_for_unknown_names() {
        let monitor = monitor_with("audio-chunk", 50);
        assert!(!monitor.is_budget_exceeded("not-configured", Duration::from_secs(999)));
    }

    #[test]
    fn budget_check_compares_strictly() {
        let monitor = monitor_with("audio-chunk", 50);
        assert!(monitor.is_budget_exceeded("audio-chunk", Duration::from_millis(80)));
        assert!(!monitor.is_budget_exceeded("audio-chunk", Duration::from_millis(50)));
        assert!(!monitor.is_budget_exceeded("audio-chunk", Duration::from_millis(20)));
    }

    #[test]
    fn last_duration_tracks_latest_sample() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        assert!(monitor.last_duration("op").is_none());
        monitor.record_duration("op", Duration::from_millis(10));
        monitor.record_duration("op", Duration::from_millis(30));
        assert_eq!(monitor.last_duration("op"), Some(Duration::from_millis(30)));
    }

    #[test]
    fn percentiles_over_known_distribution() {
        let monitor = PerformanceMonitor::new(BudgetTable::new(), ResourceLimits::default());
        for i in 1..=100u64 {
            monitor.record_duration("op", Duration::from_millis(i));
        }
        let stats = monitor.stats("op");
        assert_eq!(stats.count, 100);
        assert_eq!(stats.p50, Duration::from_millis(50));
        assert_eq!(stats.p95, Duration::from_millis(95));
        assert_eq!(stats.p99, Duration::from_millis(99));
    }

    #[test]
    fn resource_pressure_uses_latest_snapshot() {
        let limits = ResourceLimits {
            max_cpu_percent: 80.0,
            max_memory_bytes: u64::MAX,
        };
        let monitor = PerformanceMonitor::new(BudgetTable::new(), limits);
        assert!(monitor.resource_pressure().is_none());

        monitor.record_resource(ResourceSnapshot::new(95.0, 0));
        assert_eq!(monitor.resource_pressure(), Some(FailureMode::CpuSpike));

        // A calm snapshot supersedes the spike.
        monitor.record_resource(ResourceSnapshot::new(10.0, 0));
        assert!(monitor.resource_pressure().is_none());
    }
}
