//! Deadline-and-fallback wrapper for boundary-crossing calls.
//!
//! Every provider call and IPC round trip goes through
//! [`TimeoutGate::run`], which races the operation against its policy's
//! deadline. A win records the real elapsed time; a timeout records the
//! deadline as the effective duration, escalates once to the failure
//! handler, and hands the caller back the policy's fallback. Either way,
//! exactly one metric sample per call.
//!
//! # Cancellation
//!
//! Losing the race drops the operation's future, which stops polling it
//! locally. A side effect already in flight on the far side of the
//! boundary (an IPC message sent, a request on the wire) may still land:
//! an explicit at-least-once risk for non-idempotent operations. Callers
//! whose operations support cooperative cancellation should use
//! [`TimeoutGate::run_with_cancel`] and supply a cancel hook, invoked
//! best-effort on the timeout path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use ballast_monitor::PerformanceMonitor;
use ballast_types::ChannelClass;

use crate::failure::FailureModeHandler;

/// Per-call-site deadline and fallback, supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy<T> {
    pub timeout: Duration,
    pub fallback: T,
}

impl<T> TimeoutPolicy<T> {
    #[must_use]
    pub const fn new(timeout: Duration, fallback: T) -> Self {
        Self { timeout, fallback }
    }
}

/// Wraps async boundary-crossing calls with a deadline and a safe
/// fallback, instrumenting every call on the shared monitor.
#[derive(Clone)]
pub struct TimeoutGate {
    monitor: Arc<PerformanceMonitor>,
    failures: Arc<FailureModeHandler>,
}

impl std::fmt::Debug for TimeoutGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutGate").finish_non_exhaustive()
    }
}

impl TimeoutGate {
    #[must_use]
    pub fn new(monitor: Arc<PerformanceMonitor>, failures: Arc<FailureModeHandler>) -> Self {
        Self { monitor, failures }
    }

    /// Race `op` against `policy.timeout` on `channel`.
    ///
    /// - Operation settles first: its result is returned - an `Err`
    ///   propagates verbatim; the gate never swallows application
    ///   errors, only timeouts.
    /// - Deadline fires first: the fallback is returned as `Ok` and the
    ///   channel's failure mode is dispatched once.
    ///
    /// A completed call whose elapsed time breaches the channel's budget
    /// also dispatches the channel's failure mode, once.
    pub async fn run<T, E, F>(&self, channel: &str, policy: TimeoutPolicy<T>, op: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.run_with_cancel(channel, policy, None, op).await
    }

    /// [`run`](Self::run), plus a best-effort cancellation hook invoked
    /// on the timeout path for operations that support cooperative
    /// cancellation.
    pub async fn run_with_cancel<T, E, F>(
        &self,
        channel: &str,
        policy: TimeoutPolicy<T>,
        cancel: Option<Box<dyn FnOnce() + Send>>,
        op: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let class = ChannelClass::infer(channel);
        let started = Instant::now();

        match tokio::time::timeout(policy.timeout, op).await {
            Ok(result) => {
                let elapsed = started.elapsed();
                self.monitor.record_duration(channel, elapsed);
                if self.monitor.is_budget_exceeded(channel, elapsed) {
                    tracing::warn!(
                        channel,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "operation completed over budget"
                    );
                    self.failures.handle(class.failure_mode());
                }
                result
            }
            Err(_) => {
                // The effective duration for a timed-out call is the
                // deadline itself.
                self.monitor.record_duration(channel, policy.timeout);
                tracing::warn!(
                    channel,
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "operation timed out; returning fallback"
                );
                if let Some(cancel) = cancel {
                    cancel();
                }
                self.failures.handle(class.failure_mode());
                Ok(policy.fallback)
            }
        }
    }
}
