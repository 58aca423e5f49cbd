use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AnalyserConfig, CaptureConstraints};
use crate::session::SessionConfig;
use crate::turn::TurnConfig;

/// Default config file (extension optional)
pub const DEFAULT_CONFIG_PATH: &str = "config/loqa-voice";

/// Prefix of environment overrides, e.g. `LOQA_VOICE__TURN__SILENCE_GRACE_MS`
pub const ENV_PREFIX: &str = "LOQA_VOICE";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub turn: TurnSettings,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-voice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub fragment_interval_ms: u64,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,

    /// Replay this WAV file instead of opening the microphone
    pub input_file: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            fragment_interval_ms: 100,
            echo_cancellation: true,
            noise_suppression: true,
            input_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurnSettings {
    /// 0-255 spectrum level
    pub silence_threshold: f32,
    pub silence_grace_ms: u64,
    pub silence_tick_ms: u64,
    pub max_recording_secs: u64,
    pub min_payload_bytes: usize,
    pub assistant_timeout_secs: u64,
    pub speech_char_limit: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            silence_threshold: 10.0,
            silence_grace_ms: 1500,
            silence_tick_ms: 100,
            max_recording_secs: 30,
            min_payload_bytes: 1000,
            assistant_timeout_secs: 60,
            speech_char_limit: 4000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub assistant_id: String,
    pub transcription_model: String,
    pub language: String,
    pub speech_model: String,
    pub voice: String,
    pub speed: f32,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            assistant_id: String::new(),
            transcription_model: "whisper-1".to_string(),
            language: "zh".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "nova".to_string(),
            speed: 1.0,
            poll_interval_ms: 1000,
            max_poll_attempts: 60,
        }
    }
}

impl Config {
    /// Load defaults, then the optional file at `path`, then the environment
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.openai.api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                config.openai.api_key = key;
            }
        }

        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            constraints: CaptureConstraints {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                echo_cancellation: self.audio.echo_cancellation,
                noise_suppression: self.audio.noise_suppression,
            },
            fragment_interval: Duration::from_millis(self.audio.fragment_interval_ms),
            silence_threshold: self.turn.silence_threshold,
            silence_grace: Duration::from_millis(self.turn.silence_grace_ms),
            silence_tick: Duration::from_millis(self.turn.silence_tick_ms),
            max_duration: Duration::from_secs(self.turn.max_recording_secs),
            min_payload_bytes: self.turn.min_payload_bytes,
            analyser: AnalyserConfig::default(),
        }
    }

    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            session: self.session_config(),
            assistant_timeout: Duration::from_secs(self.turn.assistant_timeout_secs),
            speech_char_limit: self.turn.speech_char_limit,
            voice: self.openai.voice.clone(),
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}
