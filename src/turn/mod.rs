//! Voice turn state machine
//!
//! The `TurnController` owns the high-level state and sequences one turn
//! through the collaborator ports defined in `ports`.

mod controller;
mod ports;
mod state;

pub use controller::{TurnConfig, TurnController};
pub use ports::{
    truncate_chars, Assistant, AssistantReply, Collaborators, ConversationHandle, ConversationLog,
    InMemoryConversationLog, SpeechSynthesizer, Transcriber,
};
pub use state::{
    ConversationTurn, Notice, NoticeKind, PermissionState, Role, StartOutcome, TurnState,
};
