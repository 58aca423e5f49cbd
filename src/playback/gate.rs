use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::SpeechAudio;
use crate::error::TurnError;

/// Platform audio output
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play a silent or minimal clip to satisfy autoplay policy
    async fn prime(&self) -> Result<(), TurnError>;

    /// Play the clip and resolve once it has finished
    async fn play(&self, audio: &SpeechAudio) -> Result<(), TurnError>;

    /// Get sink name for logging
    fn name(&self) -> &str;
}

/// Plays speech and remembers whether the platform has been unlocked
pub struct PlaybackGate {
    sink: Arc<dyn AudioSink>,
    unlocked: AtomicBool,
    // Serialises concurrent unlock attempts so the sink is primed at most once
    unlocking: Mutex<()>,
}

impl PlaybackGate {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            unlocked: AtomicBool::new(false),
            unlocking: Mutex::new(()),
        }
    }

    /// Prime the sink from a user gesture
    ///
    /// Idempotent: once unlocked this is a no-op. Failures are swallowed because
    /// a later gesture may still succeed.
    pub async fn unlock(&self) {
        if self.is_unlocked() {
            return;
        }

        let _guard = self.unlocking.lock().await;
        if self.is_unlocked() {
            return;
        }

        match self.sink.prime().await {
            Ok(()) => {
                self.unlocked.store(true, Ordering::SeqCst);
                info!("Playback unlocked on {}", self.sink.name());
            }
            Err(e) => {
                warn!("Playback unlock failed, will retry on next gesture: {}", e);
            }
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    /// Play synthesized speech, resolving when playback ends
    pub async fn play(&self, audio: &SpeechAudio) -> Result<(), TurnError> {
        debug!(
            "Playing {} bytes of {} on {} (unlocked={})",
            audio.bytes.len(),
            audio.mime,
            self.sink.name(),
            self.is_unlocked()
        );

        self.sink.play(audio).await.map_err(|e| match e {
            TurnError::PlaybackFailed(_) => e,
            other => TurnError::PlaybackFailed(other.to_string()),
        })
    }
}
