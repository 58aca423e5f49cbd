use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-level voice turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Waiting for the user to start a turn
    #[default]
    Idle,
    /// Microphone open, capturing the utterance
    Listening,
    /// Transcribing and waiting on the assistant
    Thinking,
    /// Playing the spoken reply
    Speaking,
}

impl TurnState {
    /// Status text for the host UI
    pub fn label(&self) -> &'static str {
        match self {
            TurnState::Idle => "Idle",
            TurnState::Listening => "Listening…",
            TurnState::Thinking => "Thinking…",
            TurnState::Speaking => "Speaking…",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TurnState::Idle)
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Thinking => "thinking",
            TurnState::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Microphone permission as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    /// The host should offer a re-request action
    Denied,
}

/// Category of a user-visible notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    PermissionRequired,
    MicrophoneUnavailable,
    NothingUnderstood,
    TranscriptionFailed,
    AssistantFailed,
    AssistantTimeout,
    SpeechFailed,
    PlaybackFailed,
    UnsupportedPlatform,
    /// The turn broke off for a reason outside the error taxonomy
    Unexpected,
}

impl NoticeKind {
    pub fn message(&self) -> &'static str {
        match self {
            NoticeKind::PermissionRequired => {
                "Microphone access is needed to talk. Please allow it and try again."
            }
            NoticeKind::MicrophoneUnavailable => {
                "No microphone is available right now. Check the device and try again."
            }
            NoticeKind::NothingUnderstood => "Sorry, I didn't catch that. Please try again.",
            NoticeKind::TranscriptionFailed => {
                "Sorry, I couldn't make out what you said. Please try again."
            }
            NoticeKind::AssistantFailed => {
                "Sorry, I ran into a problem answering. Please try again."
            }
            NoticeKind::AssistantTimeout => "Sorry, the answer took too long. Please try again.",
            NoticeKind::SpeechFailed => "I have an answer but couldn't say it out loud.",
            NoticeKind::PlaybackFailed => "Tap anywhere to enable sound, then try again.",
            NoticeKind::UnsupportedPlatform => "Voice input isn't supported on this device.",
            NoticeKind::Unexpected => "Something went wrong. Please try again.",
        }
    }

    /// Whether this notice reports an outcome rather than a failure
    pub fn is_gentle(&self) -> bool {
        matches!(self, NoticeKind::NothingUnderstood)
    }
}

/// The single most recent user-visible notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
            at: Utc::now(),
        }
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// A recording session is open
    Listening,
    /// Not idle; the request was ignored
    Rejected,
    /// Acquisition failed; the notice has been set
    Failed(NoticeKind),
}
