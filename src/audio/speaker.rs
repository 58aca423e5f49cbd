//! Speech playback through cpal
//!
//! Synthesized speech arrives compressed (MP3 from the speech API). It is
//! decoded with symphonia and played on the default output device from a
//! blocking thread; `play` resolves once the last sample has been rendered.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, error, warn};

use super::payload::SpeechAudio;
use crate::error::TurnError;
use crate::playback::AudioSink;

/// Length of the silent clip used to prime the output
const PRIME_DURATION_MS: u64 = 50;

/// Mono f32 samples at a known rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        let len = (sample_rate as u128 * duration.as_millis() / 1000) as usize;
        Self {
            samples: vec![0.0; len],
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.samples.len() as u64 * 1000 / self.sample_rate.max(1) as u64)
    }
}

/// Default output device of the default cpal host
pub struct CpalSpeaker {
    name: String,
}

impl CpalSpeaker {
    pub fn new() -> Self {
        Self {
            name: "cpal-default-output".to_string(),
        }
    }
}

impl Default for CpalSpeaker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSink for CpalSpeaker {
    async fn prime(&self) -> Result<(), TurnError> {
        let clip = DecodedAudio::silence(Duration::from_millis(PRIME_DURATION_MS), 24000);
        tokio::task::spawn_blocking(move || play_blocking(clip))
            .await
            .map_err(|e| TurnError::PlaybackFailed(e.to_string()))?
    }

    async fn play(&self, audio: &SpeechAudio) -> Result<(), TurnError> {
        let audio = audio.clone();
        tokio::task::spawn_blocking(move || {
            let decoded =
                decode_speech(&audio).map_err(|e| TurnError::PlaybackFailed(format!("{:#}", e)))?;
            play_blocking(decoded)
        })
        .await
        .map_err(|e| TurnError::PlaybackFailed(e.to_string()))?
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decode compressed speech into mono samples
pub fn decode_speech(audio: &SpeechAudio) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(audio.bytes.clone())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_for_mime(&audio.mime) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Unsupported speech format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No decodable track in speech audio")?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("Unsupported speech codec")?;

    let mut sample_rate = codec_params.sample_rate.unwrap_or(24000);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e).context("Failed to read speech packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channels = spec.channels.count().max(1);

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);

                samples.extend(
                    buffer
                        .samples()
                        .chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                );
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable speech packet: {}", e);
            }
            Err(e) => return Err(e).context("Failed to decode speech"),
        }
    }

    debug!("Decoded {} speech samples at {}Hz", samples.len(), sample_rate);
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.split(';').next().map(str::trim) {
        Some("audio/mpeg") | Some("audio/mp3") => Some("mp3"),
        Some("audio/wav") | Some("audio/x-wav") | Some("audio/wave") => Some("wav"),
        Some("audio/ogg") | Some("audio/opus") => Some("ogg"),
        Some("audio/flac") => Some("flac"),
        Some("audio/aac") => Some("aac"),
        _ => None,
    }
}

fn play_blocking(audio: DecodedAudio) -> Result<(), TurnError> {
    if audio.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| TurnError::PlaybackFailed("no output device available".to_string()))?;

    let target = SampleRate(audio.sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| TurnError::PlaybackFailed(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= target && c.max_sample_rate() >= target)
        .min_by_key(|c| c.channels())
        .map(|c| c.with_sample_rate(target));

    let supported = match supported {
        Some(config) => config,
        None => device
            .default_output_config()
            .map_err(|e| TurnError::UnsupportedPlatform(e.to_string()))?,
    };

    let sample_format = supported.sample_format();
    let config = supported.config();
    let channels = config.channels.max(1) as usize;

    let samples = if config.sample_rate.0 == audio.sample_rate {
        audio.samples
    } else {
        resample(&audio.samples, audio.sample_rate, config.sample_rate.0)
    };
    let expected = Duration::from_millis(samples.len() as u64 * 1000 / config.sample_rate.0.max(1) as u64);

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = std_mpsc::sync_channel::<()>(1);

    let next_sample = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        move || -> Option<f32> {
            let pos = position.fetch_add(1, Ordering::Relaxed);
            samples.get(pos).copied()
        }
    };

    let err_fn = |err: cpal::StreamError| {
        error!("Playback stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::F32 => {
            let done_tx = done_tx.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = next_sample().unwrap_or_else(|| {
                            let _ = done_tx.try_send(());
                            0.0
                        });
                        frame.iter_mut().for_each(|out| *out = sample);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let done_tx = done_tx.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = next_sample().unwrap_or_else(|| {
                            let _ = done_tx.try_send(());
                            0.0
                        });
                        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                        frame.iter_mut().for_each(|out| *out = value);
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(TurnError::UnsupportedPlatform(format!(
                "unsupported output sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| TurnError::PlaybackFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| TurnError::PlaybackFailed(e.to_string()))?;

    // Wait for the callback to run out of samples, with headroom
    let result = match done_rx.recv_timeout(expected + Duration::from_millis(500)) {
        Ok(()) => Ok(()),
        Err(_) => Err(TurnError::PlaybackFailed(
            "playback did not complete in time".to_string(),
        )),
    };

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);

    debug!("Playback finished ({} samples)", samples.len());
    result
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(samples.len() - 1);
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = samples.get(idx + 1).copied().unwrap_or(a);
            a + (b - a) * frac
        })
        .collect()
}
