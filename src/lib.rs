pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod openai;
pub mod playback;
pub mod session;
pub mod turn;

pub use audio::{
    AudioDevice, AudioFile, AudioFrame, AudioPayload, CaptureConstraints, CpalMicrophone,
    CpalSpeaker, FileMicrophone, Fragment, InputStream, SpeechAudio,
};
pub use config::Config;
pub use error::TurnError;
pub use http::{create_router, AppState};
pub use openai::OpenAiClient;
pub use playback::{AudioSink, PlaybackGate};
pub use session::{
    AudioResourceHandle, Recording, RecordingSession, RecordingStats, SessionConfig,
    SilenceDetector, StopReason,
};
pub use turn::{
    Collaborators, ConversationHandle, ConversationLog, InMemoryConversationLog, StartOutcome,
    TurnConfig, TurnController, TurnState,
};
