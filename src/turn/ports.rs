use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::state::{ConversationTurn, Role};
use crate::audio::{AudioPayload, SpeechAudio};
use crate::error::TurnError;

/// Opaque token correlating exchanges into one remote conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHandle(String);

impl ConversationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reply from the assistant collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub text: String,
    pub handle: ConversationHandle,
}

/// Speech-to-text collaborator
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Recognized text, possibly empty
    async fn transcribe(&self, payload: &AudioPayload) -> Result<String, TurnError>;
}

/// Remote assistant collaborator
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Send the user's text, continuing `handle`'s conversation when given
    async fn exchange(
        &self,
        text: &str,
        handle: Option<&ConversationHandle>,
    ) -> Result<AssistantReply, TurnError>;
}

/// Text-to-speech collaborator
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SpeechAudio, TurnError>;
}

/// Append-only conversation log owned by the host
///
/// Appends are best-effort and cannot fail.
pub trait ConversationLog: Send + Sync {
    fn append(&self, role: Role, content: &str);

    /// All turns in order
    fn turns(&self) -> Vec<ConversationTurn>;
}

/// Default in-process conversation log
#[derive(Debug, Default)]
pub struct InMemoryConversationLog {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationLog for InMemoryConversationLog {
    fn append(&self, role: Role, content: &str) {
        let mut turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        turns.push(ConversationTurn::new(role, content));
    }

    fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// The external collaborators a turn is sequenced through
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub assistant: Arc<dyn Assistant>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub log: Arc<dyn ConversationLog>,
}

/// Longest prefix of `text` with at most `limit` characters
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
