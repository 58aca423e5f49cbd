use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TurnError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Size of this frame once encoded as little-endian PCM16
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }
}

/// What we ask of the microphone when acquiring it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Target sample rate (16kHz for speech recognition)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Preferred, not required
    pub echo_cancellation: bool,
    /// Preferred, not required
    pub noise_suppression: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Source of microphone streams
///
/// Implementations:
/// - `CpalMicrophone`: default input device of the host
/// - `FileMicrophone`: replays a WAV file in real time
#[async_trait]
pub trait AudioDevice: Send + Sync {
    /// Acquire a microphone stream under the given constraints
    ///
    /// Fails with `PermissionDenied` when the platform refuses access and
    /// `DeviceUnavailable` for any other acquisition failure.
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn InputStream>, TurnError>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// One acquired microphone stream
///
/// Owned exclusively by a single `AudioResourceHandle`.
pub trait InputStream: Send {
    /// Start delivering frames
    ///
    /// Returns a channel receiver that will receive audio frames until `stop`
    fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, TurnError>;

    /// Stop the underlying tracks. Must be idempotent.
    fn stop(&mut self);

    /// Check if the stream is currently delivering frames
    fn is_capturing(&self) -> bool;
}
