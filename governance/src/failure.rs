//! Failure-mode dispatch and the degradation seam.
//!
//! [`FailureModeHandler::handle`] is the single funnel for every budget
//! violation the governance layer detects. It resolves the mode's fixed
//! action, executes it through the [`DegradationHooks`] seam exactly
//! once, and logs the event. Failure handling is itself fail-safe: a
//! hook error is caught and logged, never propagated.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use ballast_types::{DegradationAction, FailureMode};

/// Cap on queued audio chunks held by [`SessionControls`].
const MAX_PENDING_CHUNKS: usize = 64;

/// Cap on retained history entries in [`SessionControls`].
const MAX_HISTORY_ENTRIES: usize = 512;

/// Seam between the governance layer and the embedding application.
///
/// One method per [`DegradationAction`], plus the queries the gated
/// surfaces need. Implementations must be cheap and local; the only
/// action permitted to cross back toward the UI is [`graceful_stop`],
/// and even that must not surface an error to the dispatcher.
///
/// [`graceful_stop`]: DegradationHooks::graceful_stop
pub trait DegradationHooks: Send + Sync {
    /// Discard the in-flight response instead of waiting for it.
    fn drop_response(&self) -> anyhow::Result<()>;
    /// Remove exactly one oldest pending audio chunk.
    fn drop_oldest_chunk(&self) -> anyhow::Result<()>;
    /// Drop one non-critical queued event.
    fn shed_non_critical_event(&self) -> anyhow::Result<()>;
    /// Stop the session cleanly and queue a user-visible notice.
    fn graceful_stop(&self) -> anyhow::Result<()>;
    /// Refuse screenshot-producing calls until re-enabled.
    fn disable_screenshots(&self) -> anyhow::Result<()>;
    /// Shrink history buffers to relieve memory pressure.
    fn trim_history(&self) -> anyhow::Result<()>;

    /// Whether screenshot-producing calls are currently admitted.
    fn screenshots_enabled(&self) -> bool;
    /// Whether a graceful stop has been requested.
    fn stopped(&self) -> bool;
}

/// Maps failure modes to their fixed degradation actions and executes
/// them, exactly one action per dispatch.
pub struct FailureModeHandler {
    hooks: Arc<dyn DegradationHooks>,
    dispatched: Mutex<HashMap<FailureMode, u64>>,
}

impl std::fmt::Debug for FailureModeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureModeHandler").finish_non_exhaustive()
    }
}

impl FailureModeHandler {
    #[must_use]
    pub fn new(hooks: Arc<dyn DegradationHooks>) -> Self {
        Self {
            hooks,
            dispatched: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch `mode`: resolve its action (total lookup), execute it
    /// once, and log the event.
    ///
    /// Never errors and never panics. Invoking twice for the same mode
    /// performs the action twice, deterministically; not invoking
    /// redundantly for one logical event is the caller's responsibility.
    pub fn handle(&self, mode: FailureMode) {
        let action = mode.action();
        tracing::warn!(%mode, %action, "dispatching degradation action");
        {
            let mut counts = self
                .dispatched
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *counts.entry(mode).or_insert(0) += 1;
        }
        if let Err(err) = self.execute(action) {
            // Fail-safe: a broken remediation must not cascade.
            tracing::error!(%mode, %action, error = %err, "degradation action failed");
        }
    }

    fn execute(&self, action: DegradationAction) -> anyhow::Result<()> {
        match action {
            DegradationAction::DropResponse => self.hooks.drop_response(),
            DegradationAction::DropOldestChunk => self.hooks.drop_oldest_chunk(),
            DegradationAction::ShedNonCriticalEvent => self.hooks.shed_non_critical_event(),
            DegradationAction::GracefulStopNotifyUser => self.hooks.graceful_stop(),
            DegradationAction::DisableScreenshots => self.hooks.disable_screenshots(),
            DegradationAction::TrimHistoryBuffers => self.hooks.trim_history(),
        }
    }

    /// Number of times `mode` has been dispatched on this handler.
    #[must_use]
    pub fn dispatch_count(&self, mode: FailureMode) -> u64 {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&mode)
            .copied()
            .unwrap_or(0)
    }

    /// The hooks this handler executes against.
    #[must_use]
    pub fn hooks(&self) -> &Arc<dyn DegradationHooks> {
        &self.hooks
    }
}

/// A user-visible notice raised by a degradation action.
///
/// This is a closed enum - only governance code constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserNotice {
    /// The session was stopped cleanly after provider exhaustion.
    SessionStopped {
        /// The failure mode that forced the stop.
        reason: FailureMode,
    },
}

impl UserNotice {
    /// Format the notice as a human-readable string for the UI layer.
    #[must_use]
    pub fn format(&self) -> String {
        match self {
            Self::SessionStopped { reason } => {
                format!("[Session stopped: {reason}. Please restart to continue.]")
            }
        }
    }
}

/// Queue of pending user notices, drained by the UI layer.
///
/// Duplicate notices are deduplicated so repeated dispatches of the same
/// condition surface once.
#[derive(Debug, Default)]
pub struct UserNoticeQueue {
    pending: Vec<UserNotice>,
}

impl UserNoticeQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notice: UserNotice) {
        if !self.pending.contains(&notice) {
            self.pending.push(notice);
        }
    }

    /// Take all pending notices in arrival order, clearing the queue.
    pub fn take(&mut self) -> Vec<UserNotice> {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug)]
struct SessionState {
    drop_next_response: bool,
    audio_chunks: VecDeque<Vec<u8>>,
    pending_events: VecDeque<String>,
    history: VecDeque<String>,
    screenshots_enabled: bool,
    stopped: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            drop_next_response: false,
            audio_chunks: VecDeque::new(),
            pending_events: VecDeque::new(),
            history: VecDeque::new(),
            screenshots_enabled: true,
            stopped: false,
        }
    }
}

/// In-memory [`DegradationHooks`] implementation for a single session.
///
/// Holds the mutable session surfaces the degradation actions operate
/// on: the pending audio-chunk queue, the non-critical event queue, the
/// history buffer, the screenshot toggle, and the stop flag. The
/// embedding application pushes into these from its side and reads the
/// notice queue for anything user-visible.
#[derive(Debug, Default)]
pub struct SessionControls {
    state: Mutex<SessionState>,
    notices: Mutex<UserNoticeQueue>,
}

impl SessionControls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an audio chunk for delivery. The queue is bounded; the
    /// oldest chunk is evicted when full.
    pub fn push_audio_chunk(&self, chunk: Vec<u8>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.audio_chunks.len() >= MAX_PENDING_CHUNKS {
            state.audio_chunks.pop_front();
        }
        state.audio_chunks.push_back(chunk);
    }

    /// Queue a non-critical event (UI refresh, progress tick).
    pub fn push_event(&self, event: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending_events.push_back(event.into());
    }

    /// Append a history entry. The buffer is bounded; the oldest entry
    /// is evicted when full.
    pub fn push_history(&self, entry: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.history.len() >= MAX_HISTORY_ENTRIES {
            state.history.pop_front();
        }
        state.history.push_back(entry.into());
    }

    #[must_use]
    pub fn audio_chunk_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.audio_chunks.len()
    }

    #[must_use]
    pub fn pending_event_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending_events.len()
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.history.len()
    }

    /// Consume the drop-response flag. Returns true exactly once per
    /// `DropResponse` dispatch; the caller discards the in-flight
    /// response when it sees true.
    pub fn take_drop_response(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut state.drop_next_response)
    }

    /// Re-admit screenshot-producing calls after a CPU spike subsided.
    pub fn enable_screenshots(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.screenshots_enabled = true;
    }

    /// Drain pending user notices for the UI layer.
    pub fn take_notices(&self) -> Vec<UserNotice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl DegradationHooks for SessionControls {
    fn drop_response(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.drop_next_response = true;
        Ok(())
    }

    fn drop_oldest_chunk(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Exactly one chunk per dispatch; an empty queue is a no-op.
        state.audio_chunks.pop_front();
        Ok(())
    }

    fn shed_non_critical_event(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending_events.pop_front();
        Ok(())
    }

    fn graceful_stop(&self) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.stopped = true;
        }
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(UserNotice::SessionStopped {
                reason: FailureMode::ProviderExhaustion,
            });
        Ok(())
    }

    fn disable_screenshots(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.screenshots_enabled = false;
        Ok(())
    }

    fn trim_history(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop the oldest half, keeping the most recent context.
        let drop_count = state.history.len() / 2;
        state.history.drain(..drop_count);
        Ok(())
    }

    fn screenshots_enabled(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.screenshots_enabled
    }

    fn stopped(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stopped
    }
}
