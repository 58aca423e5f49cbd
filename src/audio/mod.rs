pub mod analyser;
pub mod backend;
pub mod convert;
pub mod file;
pub mod microphone;
pub mod payload;
pub mod speaker;

pub use analyser::{Analyser, AnalyserConfig};
pub use backend::{AudioDevice, AudioFrame, CaptureConstraints, InputStream};
pub use file::{AudioFile, FileMicrophone};
pub use microphone::CpalMicrophone;
pub use payload::{AudioPayload, Fragment, SpeechAudio};
pub use speaker::{decode_speech, CpalSpeaker, DecodedAudio};
