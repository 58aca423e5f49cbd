//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - Microphone acquisition and release (`AudioResourceHandle`)
//! - Fragment capture at a bounded interval
//! - Silence detection and the duration cap
//! - Assembly of the final payload

mod config;
mod handle;
mod session;
mod silence;
mod stats;

pub use config::SessionConfig;
pub use handle::AudioResourceHandle;
pub use session::{Recording, RecordingSession};
pub use silence::{SilenceDetector, SilenceVerdict};
pub use stats::{RecordingStats, StopReason};
