//! Sliding-window rate limiting with exponential backoff.
//!
//! One [`RateLimiter`] instance owns one channel's admission window;
//! windows are never shared between limiters. Admission state machine:
//! `Admitting -> (window full) -> Backoff -> (delay elapsed) -> Admitting`.
//!
//! All timing goes through `tokio::time`, so tests drive the limiter
//! under paused time instead of a hand-rolled clock abstraction.

use std::collections::VecDeque;

use tokio::time::{Duration, Instant, sleep};

use ballast_types::RateLimitSettings;

#[derive(Debug)]
struct RateWindow {
    /// Admission timestamps, oldest first. Pruned before every decision
    /// so decisions always reflect the current instant.
    admitted: VecDeque<Instant>,
    /// Window-full events since the last admission; the sole input to
    /// the next backoff delay.
    consecutive_failures: u32,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Gates admission of outbound requests on one channel.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    window: tokio::sync::Mutex<RateWindow>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            window: tokio::sync::Mutex::new(RateWindow {
                admitted: VecDeque::with_capacity(settings.max_requests()),
                consecutive_failures: 0,
            }),
            settings,
        }
    }

    /// Wait for admission. Never errors; resolves only once a slot in
    /// the window is claimed.
    ///
    /// When the window is full, the wait doubles per consecutive failure
    /// up to the configured cap, then re-evaluates - an explicit loop,
    /// not recursion, so sustained contention cannot grow the stack. Any
    /// successful admission resets the backoff to the base delay (fast
    /// recovery). Backoff sleeps run to completion; no external timeout
    /// governs the limiter itself - a long wait here is intentional
    /// backpressure, not a bug.
    pub async fn acquire(&self) {
        loop {
            let delay = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                window.prune(now, self.settings.window());

                if window.admitted.len() < self.settings.max_requests() {
                    window.admitted.push_back(now);
                    window.consecutive_failures = 0;
                    tracing::debug!(
                        active = window.admitted.len(),
                        max = self.settings.max_requests(),
                        "request admitted"
                    );
                    return;
                }

                let delay = self.settings.backoff_delay(window.consecutive_failures);
                window.consecutive_failures += 1;
                delay
            };
            // Sleep outside the lock so reads stay responsive.
            tracing::debug!(delay_ms = delay.as_millis() as u64, "window full; backing off");
            sleep(delay).await;
        }
    }

    /// Slots left in the window right now. Read-only apart from the
    /// prune.
    pub async fn remaining_requests(&self) -> usize {
        let mut window = self.window.lock().await;
        window.prune(Instant::now(), self.settings.window());
        self.settings.max_requests() - window.admitted.len()
    }

    /// When the oldest active admission exits the window, or `None` when
    /// idle.
    pub async fn reset_time(&self) -> Option<Instant> {
        let mut window = self.window.lock().await;
        window.prune(Instant::now(), self.settings.window());
        window
            .admitted
            .front()
            .map(|oldest| *oldest + self.settings.window())
    }

    /// Consecutive window-full events since the last admission.
    pub async fn consecutive_failures(&self) -> u32 {
        self.window.lock().await.consecutive_failures
    }

    /// Clear timestamps and backoff state (session restart).
    pub async fn reset(&self) {
        let mut window = self.window.lock().await;
        window.admitted.clear();
        window.consecutive_failures = 0;
    }

    #[must_use]
    pub const fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }
}
