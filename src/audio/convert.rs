//! Bring captured frames to the format the session records in

use super::backend::AudioFrame;

/// Downmix and resample a frame to the target format
pub fn conform_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    // Convert to mono first so resampling touches fewer samples
    if processed.channels != target_channels && target_channels == 1 {
        processed = downmix_to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = resample_frame(processed, target_sample_rate);
    }

    processed
}

/// Average all channels into one
fn downmix_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        channels: 1,
        ..frame
    }
}

/// Resample a mono frame
///
/// Integer ratios decimate (take every Nth sample); anything else uses linear
/// interpolation. Upsampling is left alone.
fn resample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate <= target_rate || frame.channels != 1 || target_rate == 0 {
        return frame;
    }

    let samples = if frame.sample_rate % target_rate == 0 {
        let ratio = (frame.sample_rate / target_rate) as usize;
        frame.samples.iter().step_by(ratio).copied().collect()
    } else {
        resample_linear(&frame.samples, frame.sample_rate, target_rate)
    };

    AudioFrame {
        samples,
        sample_rate: target_rate,
        ..frame
    }
}

fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = pos - idx as f64;
            let a = samples[idx] as f64;
            let b = samples.get(idx + 1).copied().unwrap_or(samples[idx]) as f64;
            (a + (b - a) * frac).round() as i16
        })
        .collect()
}
