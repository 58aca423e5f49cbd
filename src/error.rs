use thiserror::Error;

use crate::turn::NoticeKind;

/// Everything that can end a turn early
///
/// All of these are caught at the `TurnController` boundary and turned into a
/// notice plus a return to `Idle`. None of them escapes to the host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnError {
    /// The platform refused microphone access
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Microphone could not be acquired for any other reason
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// Recorded payload is below the minimum viable size
    #[error("recording too short ({bytes} bytes, need {min_bytes})")]
    TooShort { bytes: usize, min_bytes: usize },

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("assistant failed: {0}")]
    AssistantFailed(String),

    /// Assistant exchange exceeded its time ceiling
    #[error("assistant timed out after {0}s")]
    AssistantTimeout(u64),

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Playback was refused or broke off
    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl TurnError {
    /// Which user-visible notice this error surfaces as
    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            TurnError::PermissionDenied(_) => NoticeKind::PermissionRequired,
            TurnError::DeviceUnavailable(_) => NoticeKind::MicrophoneUnavailable,
            TurnError::TooShort { .. } => NoticeKind::NothingUnderstood,
            TurnError::TranscriptionFailed(_) => NoticeKind::TranscriptionFailed,
            TurnError::AssistantFailed(_) => NoticeKind::AssistantFailed,
            TurnError::AssistantTimeout(_) => NoticeKind::AssistantTimeout,
            TurnError::SynthesisFailed(_) => NoticeKind::SpeechFailed,
            TurnError::PlaybackFailed(_) => NoticeKind::PlaybackFailed,
            TurnError::UnsupportedPlatform(_) => NoticeKind::UnsupportedPlatform,
        }
    }

    /// Benign outcomes get a gentle notice and are logged at `warn` instead of `error`
    pub fn is_benign(&self) -> bool {
        matches!(self, TurnError::TooShort { .. })
    }
}
