//! Metric samples, percentile stats, and resource snapshots.

use std::time::{Duration, SystemTime};

use crate::failure::FailureMode;

/// One completed timed span for a named operation class.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Metric name ("audio-chunk", "ai-roundtrip", ...).
    pub name: String,
    /// Wall-clock start of the span.
    pub started_at: SystemTime,
    /// Elapsed time of the span.
    pub duration: Duration,
}

/// Latency percentiles over the current contents of a sample buffer.
///
/// All fields are zero when no samples exist; an empty buffer is not an
/// error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricStats {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub count: usize,
}

/// Point-in-time resource usage, sampled on a periodic cadence
/// independent of per-operation samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub taken_at: SystemTime,
}

impl ResourceSnapshot {
    #[must_use]
    pub fn new(cpu_percent: f64, memory_bytes: u64) -> Self {
        Self {
            cpu_percent,
            memory_bytes,
            taken_at: SystemTime::now(),
        }
    }
}

/// Static ceilings for periodic resource snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub max_cpu_percent: f64,
    pub max_memory_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_percent: 85.0,
            max_memory_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl ResourceLimits {
    /// Evaluate a snapshot against the ceilings.
    ///
    /// At most one mode per snapshot; CPU is checked before memory so a
    /// machine that is both hot and full sheds screenshots first.
    #[must_use]
    pub fn pressure(&self, snapshot: &ResourceSnapshot) -> Option<FailureMode> {
        if snapshot.cpu_percent > self.max_cpu_percent {
            return Some(FailureMode::CpuSpike);
        }
        if snapshot.memory_bytes > self.max_memory_bytes {
            return Some(FailureMode::MemoryPressure);
        }
        None
    }
}
