use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a recording stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop from the user
    User,
    /// Sustained silence exceeded the grace period
    Silence,
    /// Hard duration ceiling reached
    DurationCap,
    /// The microphone stopped delivering frames
    StreamEnded,
    /// Ended without any stop signal (setup failure, teardown)
    Aborted,
}

/// Statistics about a finished recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStats {
    pub session_id: Uuid,

    /// When capture began
    pub started_at: DateTime<Utc>,

    /// Captured duration in seconds
    pub duration_secs: f64,

    /// Number of fragments assembled into the payload
    pub fragment_count: usize,

    /// Size of the final payload
    pub payload_bytes: usize,

    pub stop_reason: StopReason,
}
