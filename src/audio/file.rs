use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioDevice, AudioFrame, CaptureConstraints, InputStream};
use super::convert::conform_frame;
use crate::error::TurnError;

/// Decoded WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into frames of `frame_duration`, converted to the requested format
    pub fn frames(&self, frame_duration: Duration, constraints: &CaptureConstraints) -> Vec<AudioFrame> {
        let frame_len = ((self.sample_rate as u128 * frame_duration.as_millis()) / 1000) as usize
            * self.channels.max(1) as usize;
        if frame_len == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(frame_len)
            .enumerate()
            .map(|(i, chunk)| {
                let raw = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: self.sample_rate,
                    channels: self.channels,
                    timestamp_ms: i as u64 * frame_duration.as_millis() as u64,
                };
                conform_frame(raw, constraints.sample_rate, constraints.channels)
            })
            .collect()
    }
}

/// Plays a WAV file into the session as if it were a microphone
///
/// Frames are paced in real time. Once the file is exhausted the stream
/// keeps delivering silence so the silence detector can end the recording.
pub struct FileMicrophone {
    path: PathBuf,
    frame_duration: Duration,
    name: String,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>, frame_duration: Duration) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            frame_duration,
            name,
        }
    }
}

#[async_trait]
impl AudioDevice for FileMicrophone {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn InputStream>, TurnError> {
        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| TurnError::DeviceUnavailable(e.to_string()))?
            .map_err(|e| TurnError::DeviceUnavailable(format!("{:#}", e)))?;

        let frames = audio.frames(self.frame_duration, constraints);
        debug!("{} prepared {} frames", self.name, frames.len());

        Ok(Box::new(FileInputStream {
            frames: Some(frames),
            frame_duration: self.frame_duration,
            sample_rate: constraints.sample_rate,
            channels: constraints.channels,
            task: None,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FileInputStream {
    frames: Option<Vec<AudioFrame>>,
    frame_duration: Duration,
    sample_rate: u32,
    channels: u16,
    task: Option<JoinHandle<()>>,
}

impl InputStream for FileInputStream {
    fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, TurnError> {
        let frames = self
            .frames
            .take()
            .ok_or_else(|| TurnError::DeviceUnavailable("stream already started".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let frame_duration = self.frame_duration;
        let silence_len = frames
            .first()
            .map(|f| f.samples.len())
            .unwrap_or((self.sample_rate as usize * frame_duration.as_millis() as usize) / 1000);
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame_duration);
            let mut timestamp_ms = 0;

            for frame in frames {
                interval.tick().await;
                timestamp_ms = frame.timestamp_ms;
                if tx.send(frame).await.is_err() {
                    return;
                }
            }

            loop {
                interval.tick().await;
                timestamp_ms += frame_duration.as_millis() as u64;
                let silence = AudioFrame {
                    samples: vec![0; silence_len],
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                if tx.send(silence).await.is_err() {
                    return;
                }
            }
        }));

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("File stream stopped");
        }
        self.frames = None;
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for FileInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
