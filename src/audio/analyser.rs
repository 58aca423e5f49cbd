//! Spectral level analysis for voice-activity detection
//!
//! Mirrors what a browser `AnalyserNode` reports through
//! `getByteFrequencyData`: a Blackman-windowed magnitude spectrum of the most
//! recent samples, smoothed over time and mapped from a decibel range onto
//! `0..=255`. The silence detector averages those bytes into a single level.

use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use super::backend::AudioFrame;

#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// Window length in samples (power of two)
    pub fft_size: usize,
    /// Weight of the previous spectrum when smoothing (0.0 disables)
    pub smoothing: f32,
    /// Magnitude mapped to byte 0
    pub min_decibels: f32,
    /// Magnitude mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

pub struct Analyser {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex32>,
}

impl Analyser {
    pub fn new(config: AnalyserConfig) -> Self {
        let size = config.fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            window: blackman_window(size),
            history: VecDeque::with_capacity(size),
            smoothed: vec![0.0; size / 2],
            scratch: vec![Complex32::new(0.0, 0.0); size],
            fft,
            config: AnalyserConfig {
                fft_size: size,
                ..config
            },
        }
    }

    /// Feed captured audio (downmixed to mono)
    pub fn push(&mut self, frame: &AudioFrame) {
        let channels = frame.channels.max(1) as usize;
        for chunk in frame.samples.chunks(channels) {
            let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
            if self.history.len() == self.config.fft_size {
                self.history.pop_front();
            }
            self.history.push_back(sum / chunk.len() as f32);
        }
    }

    /// Current spectrum as bytes, one per bin
    ///
    /// Each call advances the smoothing state, like the browser API.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let size = self.config.fft_size;

        // Zero-pad at the front when fewer than `fft_size` samples arrived
        let pad = size - self.history.len();
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { self.history[i - pad] };
            *slot = Complex32::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let min_db = self.config.min_decibels;
        let range = self.config.max_decibels - min_db;
        let scale = 1.0 / size as f32;

        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(previous, bin)| {
                let magnitude = bin.norm() * scale;
                *previous = tau * *previous + (1.0 - tau) * magnitude;

                if *previous <= 0.0 {
                    return 0;
                }
                let db = 20.0 * previous.log10();
                let byte = 255.0 * (db - min_db) / range;
                byte.clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Mean of the byte spectrum (0.0 to 255.0)
    pub fn level(&mut self) -> f32 {
        let bins = self.byte_frequency_data();
        if bins.is_empty() {
            return 0.0;
        }
        bins.iter().map(|&b| f32::from(b)).sum::<f32>() / bins.len() as f32
    }

    /// Forget all history and smoothing state
    pub fn reset(&mut self) {
        self.history.clear();
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42_f32, 0.5_f32, 0.08_f32);
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}
