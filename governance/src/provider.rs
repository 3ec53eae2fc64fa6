//! The abstract provider boundary and its governed wrapper.
//!
//! The governance layer does not know the concrete shape of provider
//! clients; it only requires an async call that eventually settles or
//! rejects. [`ProviderClient`] is that contract, and [`GatedProvider`]
//! is the full screening chain in front of one client: rate-limiter
//! admission for discrete requests, then the timeout gate, with
//! screenshot delivery subject to the degradation state.
//!
//! Provider rejections are treated uniformly - no provider-specific
//! error taxonomy is interpreted here. The one exception a caller may
//! classify itself is quota exhaustion, reported through
//! [`crate::Governance::report_provider_exhausted`].

use std::sync::Arc;

use crate::failure::DegradationHooks;
use crate::gate::{TimeoutGate, TimeoutPolicy};
use crate::rate::RateLimiter;

use tokio::time::Duration;

/// Channel names the wrapper runs its calls under. The audio channel
/// classes as audio ingest, so a deadline miss there sheds the oldest
/// queued chunk rather than the in-flight response.
const TEXT_CHANNEL: &str = "ai.text";
const AUDIO_CHANNEL: &str = "audio.stream";
const IMAGE_CHANNEL: &str = "ai.image";

/// Contract consumed from a streaming provider client.
///
/// Each method may reject; rejections propagate to the caller unmodified.
pub trait ProviderClient: Send {
    fn init(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn send_audio(
        &mut self,
        data: &[u8],
        mime_type: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn send_image(&mut self, data: &[u8]) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn send_text(&mut self, text: &str) -> impl Future<Output = anyhow::Result<String>> + Send;
    fn close(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Per-call-class deadlines for a [`GatedProvider`].
#[derive(Debug, Clone, Copy)]
pub struct ProviderPolicies {
    pub text_timeout: Duration,
    pub audio_timeout: Duration,
    pub image_timeout: Duration,
}

impl Default for ProviderPolicies {
    fn default() -> Self {
        Self {
            text_timeout: Duration::from_secs(8),
            audio_timeout: Duration::from_millis(500),
            image_timeout: Duration::from_secs(2),
        }
    }
}

/// A provider client behind the full governance chain.
///
/// Discrete requests (`send_text`, `send_image`) are screened by the
/// rate limiter before dispatch; the continuous audio stream is gated
/// on the deadline only. A timed-out call yields its fallback (`None`
/// or `false`) rather than an error.
pub struct GatedProvider<P> {
    inner: P,
    limiter: Arc<RateLimiter>,
    gate: TimeoutGate,
    hooks: Arc<dyn DegradationHooks>,
    policies: ProviderPolicies,
}

impl<P: ProviderClient> GatedProvider<P> {
    #[must_use]
    pub fn new(
        inner: P,
        limiter: Arc<RateLimiter>,
        gate: TimeoutGate,
        hooks: Arc<dyn DegradationHooks>,
        policies: ProviderPolicies,
    ) -> Self {
        Self {
            inner,
            limiter,
            gate,
            hooks,
            policies,
        }
    }

    /// Initialize the underlying client. Lifecycle calls are not gated.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        self.inner.init().await
    }

    /// Send a text turn. `Ok(None)` means the deadline fired and the
    /// response (if any) was discarded.
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<Option<String>> {
        self.limiter.acquire().await;
        let policy = TimeoutPolicy::new(self.policies.text_timeout, None);
        let inner = &mut self.inner;
        self.gate
            .run(TEXT_CHANNEL, policy, async move {
                inner.send_text(text).await.map(Some)
            })
            .await
    }

    /// Push one audio chunk. `Ok(false)` means the deadline fired and
    /// an `AudioOverload` dispatch shed the oldest queued chunk.
    pub async fn send_audio(&mut self, data: &[u8], mime_type: &str) -> anyhow::Result<bool> {
        let policy = TimeoutPolicy::new(self.policies.audio_timeout, false);
        let inner = &mut self.inner;
        self.gate
            .run(AUDIO_CHANNEL, policy, async move {
                inner.send_audio(data, mime_type).await.map(|()| true)
            })
            .await
    }

    /// Send a screenshot. `Ok(false)` means the call was suppressed:
    /// either screenshots are disabled by a prior CPU-spike dispatch
    /// (no provider call, no rate-limit slot consumed) or the deadline
    /// fired.
    pub async fn send_image(&mut self, data: &[u8]) -> anyhow::Result<bool> {
        if !self.hooks.screenshots_enabled() {
            tracing::debug!("screenshots disabled; dropping image send");
            return Ok(false);
        }
        self.limiter.acquire().await;
        let policy = TimeoutPolicy::new(self.policies.image_timeout, false);
        let inner = &mut self.inner;
        self.gate
            .run(IMAGE_CHANNEL, policy, async move {
                inner.send_image(data).await.map(|()| true)
            })
            .await
    }

    /// Close the underlying client. Lifecycle calls are not gated.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        self.inner.close().await
    }

    #[must_use]
    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use tokio::time::{Instant, sleep};

    use ballast_monitor::PerformanceMonitor;
    use ballast_types::{BudgetTable, FailureMode, RateLimitSettings, ResourceLimits};

    use crate::failure::{FailureModeHandler, SessionControls};

    use super::*;

    /// Scripted fake client: fixed latency per call, optional rejection.
    struct FakeClient {
        latency: Duration,
        fail_text: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeClient {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                fail_text: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ProviderClient for FakeClient {
        async fn init(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_audio(&mut self, _data: &[u8], _mime_type: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.latency).await;
            Ok(())
        }

        async fn send_image(&mut self, _data: &[u8]) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.latency).await;
            Ok(())
        }

        async fn send_text(&mut self, text: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.latency).await;
            if self.fail_text {
                return Err(anyhow!("provider rejected the request"));
            }
            Ok(format!("echo: {text}"))
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn gated(
        client: FakeClient,
    ) -> (
        GatedProvider<FakeClient>,
        Arc<FailureModeHandler>,
        Arc<SessionControls>,
    ) {
        let monitor = Arc::new(PerformanceMonitor::new(
            BudgetTable::new(),
            ResourceLimits::default(),
        ));
        let controls = Arc::new(SessionControls::new());
        let failures = Arc::new(FailureModeHandler::new(controls.clone()));
        let gate = TimeoutGate::new(monitor, failures.clone());
        let limiter = Arc::new(RateLimiter::new(
            RateLimitSettings::new(
                3,
                Duration::from_millis(1000),
                Duration::from_millis(100),
                Duration::from_millis(800),
            )
            .unwrap(),
        ));
        let provider = GatedProvider::new(
            client,
            limiter,
            gate,
            controls.clone(),
            ProviderPolicies {
                text_timeout: Duration::from_millis(250),
                audio_timeout: Duration::from_millis(50),
                image_timeout: Duration::from_millis(250),
            },
        );
        (provider, failures, controls)
    }

    #[tokio::test(start_paused = true)]
    async fn text_round_trip_within_deadline() {
        let (mut provider, failures, _) = gated(FakeClient::new(Duration::from_millis(10)));
        let reply = provider.send_text("hello").await.unwrap();
        assert_eq!(reply.as_deref(), Some("echo: hello"));
        assert_eq!(failures.dispatch_count(FailureMode::AiTimeout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_text_yields_fallback_and_one_dispatch() {
        let (mut provider, failures, _) = gated(FakeClient::new(Duration::from_millis(400)));
        let started = Instant::now();
        let reply = provider.send_text("hello").await.unwrap();
        assert_eq!(reply, None);
        assert_eq!(started.elapsed(), Duration::from_millis(250));
        assert_eq!(failures.dispatch_count(FailureMode::AiTimeout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_rejection_passes_through() {
        let mut client = FakeClient::new(Duration::from_millis(10));
        client.fail_text = true;
        let (mut provider, failures, _) = gated(client);

        let err = provider.send_text("hello").await.unwrap_err();
        assert!(err.to_string().contains("provider rejected"));
        assert_eq!(failures.dispatch_count(FailureMode::AiTimeout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_screenshots_suppress_image_sends() {
        let (mut provider, failures, _) = gated(FakeClient::new(Duration::from_millis(10)));
        let inner_calls = provider.inner.calls.clone();

        failures.handle(FailureMode::CpuSpike);
        assert!(!provider.send_image(&[0u8; 4]).await.unwrap());
        // Suppressed locally: no provider call happened.
        assert_eq!(inner_calls.load(Ordering::SeqCst), 0);

        // Second dispatch leaves the state unchanged; still suppressed.
        failures.handle(FailureMode::CpuSpike);
        assert!(!provider.send_image(&[0u8; 4]).await.unwrap());
        assert_eq!(inner_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn audio_is_gated_but_not_rate_limited() {
        let (mut provider, _, _) = gated(FakeClient::new(Duration::from_millis(1)));
        // Far more sends than the limiter's window capacity; none block.
        let started = Instant::now();
        for _ in 0..10 {
            assert!(provider.send_audio(&[0u8; 16], "audio/pcm").await.unwrap());
        }
        assert_eq!(started.elapsed(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_audio_sheds_oldest_chunk_not_the_response() {
        let (mut provider, failures, controls) = gated(FakeClient::new(Duration::from_millis(200)));
        controls.push_audio_chunk(vec![1]);
        controls.push_audio_chunk(vec![2]);

        // 200ms client latency against the 50ms audio deadline.
        assert!(!provider.send_audio(&[0u8; 16], "audio/pcm").await.unwrap());

        assert_eq!(failures.dispatch_count(FailureMode::AudioOverload), 1);
        assert_eq!(failures.dispatch_count(FailureMode::AiTimeout), 0);
        // One chunk shed from the front of the queue.
        assert_eq!(controls.audio_chunk_count(), 1);
        // The in-flight text response stays intact.
        assert!(!controls.take_drop_response());
    }

    #[tokio::test(start_paused = true)]
    async fn discrete_requests_consume_rate_slots() {
        let (mut provider, _, _) = gated(FakeClient::new(Duration::from_millis(1)));
        for _ in 0..3 {
            provider.send_text("hi").await.unwrap();
        }
        // Window of 3 consumed: the next request backs off before
        // admission instead of dispatching immediately.
        let started = Instant::now();
        provider.send_text("hi").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
