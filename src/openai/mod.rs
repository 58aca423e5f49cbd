//! OpenAI adapters for the transcription, assistant and speech ports

mod client;
mod messages;

pub use client::OpenAiClient;
pub use messages::{MessageList, Run, RunStatus};
