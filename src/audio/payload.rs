use anyhow::{Context, Result};
use std::io::Cursor;

/// One chunk of captured audio, flushed at a bounded interval while recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Position within the session (0-indexed, arrival order)
    pub sequence: u64,
    /// Little-endian PCM16 bytes
    pub bytes: Vec<u8>,
    /// Milliseconds since the session began
    pub captured_at_ms: u64,
}

impl Fragment {
    pub fn from_samples(sequence: u64, samples: &[i16], captured_at_ms: u64) -> Self {
        Self {
            sequence,
            bytes: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            captured_at_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The finalized recording of one session, handed to transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    /// Mime hint for the transcription collaborator
    pub mime: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub fragment_count: usize,
}

impl AudioPayload {
    /// Concatenate fragments in the order given
    pub fn assemble(fragments: &[Fragment], sample_rate: u32, channels: u16) -> Self {
        let total: usize = fragments.iter().map(Fragment::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for fragment in fragments {
            bytes.extend_from_slice(&fragment.bytes);
        }

        Self {
            bytes,
            mime: format!("audio/L16;rate={};channels={}", sample_rate, channels),
            sample_rate,
            channels,
            fragment_count: fragments.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Duration in seconds = samples / (sample_rate * channels)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        (self.bytes.len() / 2) as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Wrap the raw PCM in a WAV container for upload
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;

            for pair in self.bytes.chunks_exact(2) {
                writer
                    .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                    .context("Failed to write sample to WAV")?;
            }

            writer.finalize().context("Failed to finalize WAV")?;
        }

        Ok(cursor.into_inner())
    }
}

/// Synthesized speech ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    /// e.g. `audio/mpeg`
    pub mime: String,
}

impl SpeechAudio {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_encodes_little_endian() {
        let fragment = Fragment::from_samples(0, &[1, -1], 0);
        assert_eq!(fragment.bytes, vec![0x01, 0x00, 0xff, 0xff]);
        assert_eq!(fragment.len(), 4);
    }

    #[test]
    fn test_assemble_preserves_order_and_length() {
        let fragments = vec![
            Fragment::from_samples(0, &[1, 2, 3], 0),
            Fragment::from_samples(1, &[4], 100),
            Fragment::from_samples(2, &[5, 6], 200),
        ];

        let payload = AudioPayload::assemble(&fragments, 16000, 1);

        let expected: usize = fragments.iter().map(Fragment::len).sum();
        assert_eq!(payload.len(), expected);
        assert_eq!(payload.fragment_count, 3);

        let samples: Vec<i16> = payload
            .bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_empty_payload() {
        let payload = AudioPayload::assemble(&[], 16000, 1);
        assert!(payload.is_empty());
        assert_eq!(payload.duration_secs(), 0.0);
        assert_eq!(payload.mime, "audio/L16;rate=16000;channels=1");
    }

    #[test]
    fn test_to_wav_round_trips_through_hound() -> Result<()> {
        let fragments = vec![Fragment::from_samples(0, &[100, -200, 300, -400], 0)];
        let payload = AudioPayload::assemble(&fragments, 16000, 1);

        let wav = payload.to_wav()?;
        let reader = hound::WavReader::new(Cursor::new(wav))?;
        assert_eq!(reader.spec().sample_rate, 16000);
        let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(samples, vec![100, -200, 300, -400]);

        Ok(())
    }
}
