//! Composition root for the governance layer.
//!
//! [`Governance::new`] is the one place the shared monitor, the failure
//! handler, the timeout gate, and the per-channel rate limiters are
//! constructed and wired together. Everything downstream receives
//! handles; nothing here is a process-wide global, so tests build fresh,
//! isolated instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use ballast_config::{BallastConfig, ConfigError};
use ballast_monitor::PerformanceMonitor;
use ballast_types::{FailureMode, ResourceSnapshot};

use crate::failure::{DegradationHooks, FailureModeHandler};
use crate::gate::TimeoutGate;
use crate::provider::{GatedProvider, ProviderClient, ProviderPolicies};
use crate::rate::RateLimiter;

/// Wired governance collaborators for one session.
pub struct Governance {
    monitor: Arc<PerformanceMonitor>,
    failures: Arc<FailureModeHandler>,
    gate: TimeoutGate,
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl std::fmt::Debug for Governance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governance")
            .field("channels", &self.limiters.len())
            .finish_non_exhaustive()
    }
}

impl Governance {
    /// Build the full layer from loaded configuration.
    ///
    /// One rate limiter is created per `[channels]` entry; the budget
    /// table and resource ceilings feed the shared monitor.
    pub fn new(
        config: &BallastConfig,
        hooks: Arc<dyn DegradationHooks>,
    ) -> Result<Self, ConfigError> {
        let monitor = Arc::new(PerformanceMonitor::new(
            config.budget_table(),
            config.resource_limits(),
        ));
        let failures = Arc::new(FailureModeHandler::new(hooks));
        let gate = TimeoutGate::new(monitor.clone(), failures.clone());

        let mut limiters = HashMap::new();
        for name in config.channel_names() {
            if let Some(settings) = config.channel_settings(name)? {
                limiters.insert(name.to_string(), Arc::new(RateLimiter::new(settings)));
            }
        }
        tracing::debug!(channels = limiters.len(), "governance layer wired");

        Ok(Self {
            monitor,
            failures,
            gate,
            limiters,
        })
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    #[must_use]
    pub fn failures(&self) -> &Arc<FailureModeHandler> {
        &self.failures
    }

    #[must_use]
    pub fn gate(&self) -> &TimeoutGate {
        &self.gate
    }

    /// The rate limiter for a configured channel.
    ///
    /// `None` for unknown channels - a typoed name fails visibly in the
    /// caller instead of silently admitting everything.
    #[must_use]
    pub fn limiter(&self, channel: &str) -> Option<&Arc<RateLimiter>> {
        self.limiters.get(channel)
    }

    /// Wrap a provider client with the screening chain for `channel`.
    pub fn gated_provider<P: ProviderClient>(
        &self,
        channel: &str,
        client: P,
        policies: ProviderPolicies,
    ) -> Option<GatedProvider<P>> {
        let limiter = self.limiter(channel)?.clone();
        Some(GatedProvider::new(
            client,
            limiter,
            self.gate.clone(),
            self.failures.hooks().clone(),
            policies,
        ))
    }

    /// Report a provider quota rejection classified by the caller.
    ///
    /// Dispatches `ProviderExhaustion` once per call; the matrix routes
    /// it to a graceful stop with a user notice.
    pub fn report_provider_exhausted(&self) {
        self.failures.handle(FailureMode::ProviderExhaustion);
    }

    /// Spawn the periodic resource watcher.
    ///
    /// Each tick records one snapshot and dispatches at most one
    /// resource failure mode for it. The embedder aborts the handle on
    /// shutdown.
    pub fn spawn_resource_watcher<F>(&self, sampler: F, interval: Duration) -> JoinHandle<()>
    where
        F: Fn() -> ResourceSnapshot + Send + 'static,
    {
        let monitor = self.monitor.clone();
        let failures = self.failures.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the cadence
            // starts one interval from spawn.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor.record_resource(sampler());
                if let Some(mode) = monitor.resource_pressure() {
                    failures.handle(mode);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ballast_types::DegradationAction;

    use crate::failure::SessionControls;

    use super::*;

    fn config() -> BallastConfig {
        toml::from_str(
            r#"
[budgets]
"ai.text" = { threshold_ms = 2000 }

[channels."ai.chat"]
max_requests = 2
window_ms = 1000
base_delay_ms = 50
max_delay_ms = 400

[resources]
max_cpu_percent = 80.0
sample_interval_ms = 100
"#,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn wires_limiters_from_config() {
        let governance =
            Governance::new(&config(), Arc::new(SessionControls::new())).unwrap();
        assert!(governance.limiter("ai.chat").is_some());
        assert!(governance.limiter("nope").is_none());

        let limiter = governance.limiter("ai.chat").unwrap();
        assert_eq!(limiter.remaining_requests().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_exhaustion_stops_the_session() {
        let controls = Arc::new(SessionControls::new());
        let governance = Governance::new(&config(), controls.clone()).unwrap();

        governance.report_provider_exhausted();
        assert!(controls.stopped());
        assert_eq!(
            FailureMode::ProviderExhaustion.action(),
            DegradationAction::GracefulStopNotifyUser
        );
        assert_eq!(controls.take_notices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resource_watcher_dispatches_on_pressure() {
        let controls = Arc::new(SessionControls::new());
        let governance = Governance::new(&config(), controls.clone()).unwrap();

        let cpu = Arc::new(Mutex::new(10.0f64));
        let cpu_in = cpu.clone();
        let watcher = governance.spawn_resource_watcher(
            move || ResourceSnapshot::new(*cpu_in.lock().unwrap(), 0),
            Duration::from_millis(100),
        );

        // Two calm ticks.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(controls.screenshots_enabled());

        // Spike the sampler; the next tick disables screenshots.
        *cpu.lock().unwrap() = 95.0;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!controls.screenshots_enabled());
        assert!(
            governance
                .failures()
                .dispatch_count(FailureMode::CpuSpike)
                >= 1
        );

        watcher.abort();
    }
}
