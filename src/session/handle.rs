use tokio::sync::mpsc;
use tracing::debug;

use crate::audio::{
    Analyser, AnalyserConfig, AudioDevice, AudioFrame, CaptureConstraints, InputStream,
};
use crate::error::TurnError;

/// Every hardware-facing resource of one recording attempt
///
/// Holds the microphone stream, the frame tap the recorder reads from and the
/// analysis graph the silence detector samples. Acquire and release are
/// symmetric; `release` is idempotent and also runs on drop.
pub struct AudioResourceHandle {
    device_name: String,
    stream: Option<Box<dyn InputStream>>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    analyser: Option<Analyser>,
    analyser_config: AnalyserConfig,
}

impl AudioResourceHandle {
    /// Acquire the microphone stream (does not start it)
    pub async fn acquire(
        device: &dyn AudioDevice,
        constraints: &CaptureConstraints,
        analyser_config: AnalyserConfig,
    ) -> Result<Self, TurnError> {
        let stream = device.open(constraints).await?;
        debug!("Acquired microphone stream from {}", device.name());

        Ok(Self {
            device_name: device.name().to_string(),
            stream: Some(stream),
            frames: None,
            analyser: None,
            analyser_config,
        })
    }

    /// Start the stream and connect the analysis graph
    pub fn connect(&mut self) -> Result<(), TurnError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TurnError::DeviceUnavailable("stream already released".to_string()))?;

        let frames = stream.start()?;
        self.frames = Some(frames);
        self.analyser = Some(Analyser::new(self.analyser_config.clone()));

        debug!("Connected analysis graph to {}", self.device_name);
        Ok(())
    }

    /// Next captured frame, fed through the analyser on the way
    ///
    /// Pending forever when not connected, `None` once the stream has ended.
    pub async fn next_frame(&mut self) -> Option<AudioFrame> {
        let frame = match self.frames.as_mut() {
            Some(frames) => frames.recv().await,
            None => std::future::pending().await,
        }?;

        if let Some(analyser) = self.analyser.as_mut() {
            analyser.push(&frame);
        }
        Some(frame)
    }

    /// Frames already delivered but not yet read
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        let mut drained = Vec::new();
        if let Some(frames) = self.frames.as_mut() {
            while let Ok(frame) = frames.try_recv() {
                drained.push(frame);
            }
        }
        drained
    }

    /// Current spectrum level (0.0 when the graph is not connected)
    pub fn level(&mut self) -> f32 {
        self.analyser.as_mut().map(Analyser::level).unwrap_or(0.0)
    }

    /// Number of resources still held
    pub fn outstanding(&self) -> usize {
        self.stream.is_some() as usize + self.frames.is_some() as usize + self.analyser.is_some() as usize
    }

    pub fn is_released(&self) -> bool {
        self.outstanding() == 0
    }

    /// Disconnect the graph, close the tap and stop the tracks
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }

        if let Some(mut analyser) = self.analyser.take() {
            analyser.reset();
        }

        if let Some(mut frames) = self.frames.take() {
            frames.close();
        }

        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }

        debug!("Released microphone resources of {}", self.device_name);
    }
}

impl Drop for AudioResourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}
