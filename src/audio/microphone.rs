//! Microphone capture through cpal
//!
//! cpal streams are not `Send` on every platform, so each acquired stream
//! lives on its own thread. The `InputStream` handle talks to that thread
//! over a command channel and receives frames over a tokio channel.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioDevice, AudioFrame, CaptureConstraints, InputStream};
use super::convert::conform_frame;
use crate::error::TurnError;

/// Frames buffered between the audio thread and the session
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Default input device of the default cpal host
pub struct CpalMicrophone {
    name: String,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self {
            name: "cpal-default-input".to_string(),
        }
    }
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioDevice for CpalMicrophone {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<Box<dyn InputStream>, TurnError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (command_tx, command_rx) = std_mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let constraints = constraints.clone();

        let thread = std::thread::Builder::new()
            .name("loqa-mic".to_string())
            .spawn(move || stream_thread(constraints, ready_tx, command_rx, frame_tx))
            .map_err(|e| TurnError::DeviceUnavailable(format!("failed to spawn audio thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!("Microphone acquired: {}", device_name);
                Ok(Box::new(CpalInputStream {
                    commands: command_tx,
                    frames: Some(frame_rx),
                    thread: Some(thread),
                    capturing: false,
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(TurnError::DeviceUnavailable("audio thread exited during setup".to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

enum Command {
    Play,
    Stop,
}

struct CpalInputStream {
    commands: std_mpsc::Sender<Command>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    thread: Option<JoinHandle<()>>,
    capturing: bool,
}

impl InputStream for CpalInputStream {
    fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, TurnError> {
        let frames = self
            .frames
            .take()
            .ok_or_else(|| TurnError::DeviceUnavailable("stream already started".to_string()))?;

        self.commands
            .send(Command::Play)
            .map_err(|_| TurnError::DeviceUnavailable("audio thread is gone".to_string()))?;

        self.capturing = true;
        Ok(frames)
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // The thread may already be gone if the device disappeared
            let _ = self.commands.send(Command::Stop);
            if thread.join().is_err() {
                error!("Microphone thread panicked");
            }
            debug!("Microphone stream stopped");
        }
        self.frames = None;
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the cpal stream for its whole life
fn stream_thread(
    constraints: CaptureConstraints,
    ready: oneshot::Sender<Result<String, TurnError>>,
    commands: std_mpsc::Receiver<Command>,
    frames: mpsc::Sender<AudioFrame>,
) {
    let (stream, device_name) = match build_stream(&constraints, frames) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(device_name)).is_err() {
        // Nobody is waiting any more; release immediately
        return;
    }

    while let Ok(command) = commands.recv() {
        match command {
            Command::Play => {
                if let Err(e) = stream.play() {
                    error!("Failed to start microphone stream: {}", e);
                    break;
                }
            }
            Command::Stop => break,
        }
    }

    drop(stream);
}

fn build_stream(
    constraints: &CaptureConstraints,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, String), TurnError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| TurnError::DeviceUnavailable("no input device available".to_string()))?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    if constraints.echo_cancellation || constraints.noise_suppression {
        debug!(
            "Input processing preferences (echo_cancellation={}, noise_suppression={}) are not available through cpal",
            constraints.echo_cancellation, constraints.noise_suppression
        );
    }

    let supported = select_config(&device, constraints)?;
    let sample_format = supported.sample_format();
    let config = supported.config();

    debug!(
        "Opening {} at {}Hz, {} channels ({:?})",
        device_name, config.sample_rate.0, config.channels, sample_format
    );

    let mut sink = FrameSink {
        tx: frames,
        source_rate: config.sample_rate.0,
        source_channels: config.channels,
        target_rate: constraints.sample_rate,
        target_channels: constraints.channels,
        frames_emitted: 0,
    };

    let err_fn = |err: cpal::StreamError| {
        error!("Microphone stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| sink.push(data.to_vec()),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                sink.push(data.iter().map(|&s| (s as i32 - 32768) as i16).collect())
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink.push(
                    data.iter()
                        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
                        .collect(),
                )
            },
            err_fn,
            None,
        ),
        other => {
            return Err(TurnError::UnsupportedPlatform(format!(
                "unsupported input sample format {:?}",
                other
            )))
        }
    }
    .map_err(classify_build_error)?;

    Ok((stream, device_name))
}

/// Prefer a config that already matches, fall back to the device default
fn select_config(
    device: &cpal::Device,
    constraints: &CaptureConstraints,
) -> Result<SupportedStreamConfig, TurnError> {
    let target = SampleRate(constraints.sample_rate);

    let matching = device
        .supported_input_configs()
        .map_err(|e| classify_message(&e.to_string()))?
        .find(|c| {
            c.channels() == constraints.channels
                && c.min_sample_rate() <= target
                && c.max_sample_rate() >= target
        });

    if let Some(range) = matching {
        return Ok(range.with_sample_rate(target));
    }

    device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
            TurnError::UnsupportedPlatform("device has no input configuration".to_string())
        }
        other => classify_message(&other.to_string()),
    })
}

fn classify_build_error(err: cpal::BuildStreamError) -> TurnError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            TurnError::DeviceUnavailable("input device not available".to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported => {
            TurnError::UnsupportedPlatform("stream configuration not supported".to_string())
        }
        other => classify_message(&other.to_string()),
    }
}

/// Backends report refused access as free-form text
pub(crate) fn classify_message(message: &str) -> TurnError {
    let lower = message.to_lowercase();
    let refused = ["permission", "denied", "not authorized", "not permitted", "notallowed"];

    if refused.iter().any(|needle| lower.contains(needle)) {
        TurnError::PermissionDenied(message.to_string())
    } else {
        TurnError::DeviceUnavailable(message.to_string())
    }
}

/// Converts raw callback buffers into session-format frames
struct FrameSink {
    tx: mpsc::Sender<AudioFrame>,
    source_rate: u32,
    source_channels: u16,
    target_rate: u32,
    target_channels: u16,
    frames_emitted: u64,
}

impl FrameSink {
    fn push(&mut self, samples: Vec<i16>) {
        let raw = AudioFrame {
            samples,
            sample_rate: self.source_rate,
            channels: self.source_channels,
            timestamp_ms: self.frames_emitted * 1000 / self.target_rate.max(1) as u64,
        };

        let frame = conform_frame(raw, self.target_rate, self.target_channels);
        self.frames_emitted += (frame.samples.len() / frame.channels.max(1) as usize) as u64;

        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(frame) {
            warn!("Dropping microphone frame: session is not keeping up");
        }
    }
}
