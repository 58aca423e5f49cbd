use std::time::Duration;

use crate::audio::{AnalyserConfig, CaptureConstraints};

/// Tunables for one recording attempt
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// What to ask of the microphone
    pub constraints: CaptureConstraints,

    /// How often buffered samples are cut into a fragment
    /// Default: 100ms
    pub fragment_interval: Duration,

    /// Average spectrum level (0-255) above which a sample counts as sound
    /// Default: 10.0
    pub silence_threshold: f32,

    /// Sustained silence that ends the recording
    /// Default: 1500ms
    pub silence_grace: Duration,

    /// How often the silence detector samples the analyser
    /// Default: 100ms
    pub silence_tick: Duration,

    /// Hard ceiling on a single recording
    /// Default: 30 seconds
    pub max_duration: Duration,

    /// Payloads smaller than this are reported as too short
    /// Default: 1000 bytes
    pub min_payload_bytes: usize,

    /// Spectral analysis settings
    pub analyser: AnalyserConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            fragment_interval: Duration::from_millis(100),
            silence_threshold: 10.0,
            silence_grace: Duration::from_millis(1500),
            silence_tick: Duration::from_millis(100),
            max_duration: Duration::from_secs(30),
            min_payload_bytes: 1000,
            analyser: AnalyserConfig::default(),
        }
    }
}
