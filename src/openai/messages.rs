use serde::{Deserialize, Serialize};

/// Body of `POST /threads/{id}/messages`
#[derive(Debug, Serialize)]
pub struct CreateMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Body of `POST /threads/{id}/runs`
#[derive(Debug, Serialize)]
pub struct CreateRun<'a> {
    pub assistant_id: &'a str,
}

/// Body of `POST /audio/speech`
#[derive(Debug, Serialize)]
pub struct SpeechRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
    pub voice: &'a str,
    pub speed: f32,
}

#[derive(Debug, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Terminal without a reply
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Failed | RunStatus::Expired | RunStatus::Incomplete
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
pub struct MessageList {
    pub data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub value: String,
}

impl MessageList {
    /// Text of the newest assistant message (the list is newest first)
    pub fn latest_assistant_text(&self) -> Option<String> {
        let message = self.data.iter().find(|m| m.role == "assistant")?;

        let text: String = message
            .content
            .iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Other => None,
            })
            .collect();

        Some(text)
    }
}
