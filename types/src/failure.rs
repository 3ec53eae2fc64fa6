//! Failure modes and their fixed degradation actions.
//!
//! Both enums are closed: only governance code constructs them, and the
//! mode-to-action mapping is an exhaustive `match`. Adding a failure mode
//! without deciding its action fails to compile rather than silently
//! falling through to a default.

/// An abnormal condition the governance layer knows how to absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureMode {
    /// An AI provider round trip exceeded its deadline.
    AiTimeout,
    /// Audio-chunk ingestion fell behind its latency budget.
    AudioOverload,
    /// A general IPC round trip exceeded its deadline or budget.
    IpcCongestion,
    /// The provider refused further requests (quota or hard rate limit).
    ProviderExhaustion,
    /// CPU usage crossed the configured ceiling.
    CpuSpike,
    /// Memory usage crossed the configured ceiling.
    MemoryPressure,
}

/// A bounded, local remediation performed when a failure mode fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegradationAction {
    /// Discard the in-flight response instead of waiting for it.
    DropResponse,
    /// Remove exactly one oldest pending audio chunk.
    DropOldestChunk,
    /// Drop one non-critical queued event.
    ShedNonCriticalEvent,
    /// Stop the session cleanly and tell the user why.
    GracefulStopNotifyUser,
    /// Refuse screenshot-producing calls until re-enabled.
    DisableScreenshots,
    /// Shrink history buffers to relieve memory pressure.
    TrimHistoryBuffers,
}

impl FailureMode {
    /// The fixed action for this mode.
    ///
    /// Total by construction: every mode maps to exactly one action.
    /// This table is a compile-time constant, not configuration.
    #[must_use]
    pub const fn action(self) -> DegradationAction {
        match self {
            FailureMode::AiTimeout => DegradationAction::DropResponse,
            FailureMode::AudioOverload => DegradationAction::DropOldestChunk,
            FailureMode::IpcCongestion => DegradationAction::ShedNonCriticalEvent,
            FailureMode::ProviderExhaustion => DegradationAction::GracefulStopNotifyUser,
            FailureMode::CpuSpike => DegradationAction::DisableScreenshots,
            FailureMode::MemoryPressure => DegradationAction::TrimHistoryBuffers,
        }
    }
}

impl std::fmt::Display for FailureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureMode::AiTimeout => "ai-timeout",
            FailureMode::AudioOverload => "audio-overload",
            FailureMode::IpcCongestion => "ipc-congestion",
            FailureMode::ProviderExhaustion => "provider-exhaustion",
            FailureMode::CpuSpike => "cpu-spike",
            FailureMode::MemoryPressure => "memory-pressure",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for DegradationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DegradationAction::DropResponse => "drop-response",
            DegradationAction::DropOldestChunk => "drop-oldest-chunk",
            DegradationAction::ShedNonCriticalEvent => "shed-non-critical-event",
            DegradationAction::GracefulStopNotifyUser => "graceful-stop-notify-user",
            DegradationAction::DisableScreenshots => "disable-screenshots",
            DegradationAction::TrimHistoryBuffers => "trim-history-buffers",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a gated channel, derived from its name.
///
/// Channel names are dotted strings chosen by the caller ("ai.chat",
/// "audio.ingest", "ipc.ocr"). The first segment picks the class; anything
/// unrecognized is treated as general IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelClass {
    AiProvider,
    AudioIngest,
    ScreenshotCapture,
    Ipc,
}

impl ChannelClass {
    /// Classify a channel by the leading segment of its name.
    #[must_use]
    pub fn infer(channel: &str) -> Self {
        let head = channel.split('.').next().unwrap_or(channel);
        match head {
            "ai" => ChannelClass::AiProvider,
            "audio" => ChannelClass::AudioIngest,
            "screenshot" => ChannelClass::ScreenshotCapture,
            _ => ChannelClass::Ipc,
        }
    }

    /// The failure mode raised when an operation on this channel blows
    /// its deadline or budget.
    #[must_use]
    pub const fn failure_mode(self) -> FailureMode {
        match self {
            ChannelClass::AiProvider => FailureMode::AiTimeout,
            ChannelClass::AudioIngest => FailureMode::AudioOverload,
            ChannelClass::ScreenshotCapture | ChannelClass::Ipc => FailureMode::IpcCongestion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MODES: [FailureMode; 6] = [
        FailureMode::AiTimeout,
        FailureMode::AudioOverload,
        FailureMode::IpcCongestion,
        FailureMode::ProviderExhaustion,
        FailureMode::CpuSpike,
        FailureMode::MemoryPressure,
    ];

    #[test]
    fn every_mode_has_exactly_one_action() {
        // The match in action() is exhaustive, so this mostly pins the
        // table itself against accidental edits.
        assert_eq!(
            FailureMode::AiTimeout.action(),
            DegradationAction::DropResponse
        );
        assert_eq!(
            FailureMode::AudioOverload.action(),
            DegradationAction::DropOldestChunk
        );
        assert_eq!(
            FailureMode::IpcCongestion.action(),
            DegradationAction::ShedNonCriticalEvent
        );
        assert_eq!(
            FailureMode::ProviderExhaustion.action(),
            DegradationAction::GracefulStopNotifyUser
        );
        assert_eq!(
            FailureMode::CpuSpike.action(),
            DegradationAction::DisableScreenshots
        );
        assert_eq!(
            FailureMode::MemoryPressure.action(),
            DegradationAction::TrimHistoryBuffers
        );
    }

    #[test]
    fn actions_are_distinct_per_mode() {
        for (i, a) in ALL_MODES.iter().enumerate() {
            for b in &ALL_MODES[i + 1..] {
                assert_ne!(a.action(), b.action());
            }
        }
    }

    #[test]
    fn channel_class_inference() {
        assert_eq!(ChannelClass::infer("ai.chat"), ChannelClass::AiProvider);
        assert_eq!(ChannelClass::infer("ai"), ChannelClass::AiProvider);
        assert_eq!(ChannelClass::infer("audio.ingest"), ChannelClass::AudioIngest);
        assert_eq!(
            ChannelClass::infer("screenshot.capture"),
            ChannelClass::ScreenshotCapture
        );
        assert_eq!(ChannelClass::infer("ipc.ocr"), ChannelClass::Ipc);
        assert_eq!(ChannelClass::infer("anything-else"), ChannelClass::Ipc);
        assert_eq!(ChannelClass::infer(""), ChannelClass::Ipc);
    }

    #[test]
    fn timeout_modes_by_class() {
        assert_eq!(
            ChannelClass::AiProvider.failure_mode(),
            FailureMode::AiTimeout
        );
        assert_eq!(
            ChannelClass::AudioIngest.failure_mode(),
            FailureMode::AudioOverload
        );
        assert_eq!(ChannelClass::Ipc.failure_mode(), FailureMode::IpcCongestion);
        assert_eq!(
            ChannelClass::ScreenshotCapture.failure_mode(),
            FailureMode::IpcCongestion
        );
    }

    #[test]
    fn display_names_are_kebab_case() {
        assert_eq!(FailureMode::CpuSpike.to_string(), "cpu-spike");
        assert_eq!(
            DegradationAction::GracefulStopNotifyUser.to_string(),
            "graceful-stop-notify-user"
        );
    }
}
