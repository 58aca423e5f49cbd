use super::config::SessionConfig;
use super::handle::AudioResourceHandle;
use super::silence::{SilenceDetector, SilenceVerdict};
use super::stats::{RecordingStats, StopReason};
use crate::audio::{AudioDevice, AudioPayload, Fragment};
use crate::error::TurnError;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

/// The outcome of one finished recording
#[derive(Debug, Clone)]
pub struct Recording {
    pub payload: AudioPayload,
    pub reason: StopReason,
    pub duration: Duration,
    pub stats: RecordingStats,
}

impl Recording {
    /// The payload, unless it is too small to contain speech
    pub fn into_viable(self, min_bytes: usize) -> Result<AudioPayload, TurnError> {
        if self.payload.len() < min_bytes {
            return Err(TurnError::TooShort {
                bytes: self.payload.len(),
                min_bytes,
            });
        }
        Ok(self.payload)
    }
}

/// One listening attempt: capture a bounded utterance into a payload
///
/// Lifecycle is `open` → `begin` → `run` → `end`. `end` releases every
/// resource and may be called at any point, any number of times.
pub struct RecordingSession {
    id: Uuid,
    config: SessionConfig,
    handle: AudioResourceHandle,
    detector: SilenceDetector,

    /// Fragments in arrival order
    fragments: Vec<Fragment>,

    /// Samples received since the last fragment was cut
    pending: Vec<i16>,

    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    started_wall: chrono::DateTime<Utc>,
    capturing: bool,
    ended: bool,
    stop_reason: Option<StopReason>,
}

impl RecordingSession {
    /// Acquire the microphone for a new session
    pub async fn open(device: &dyn AudioDevice, config: SessionConfig) -> Result<Self, TurnError> {
        let id = Uuid::new_v4();
        info!("Opening recording session {} on {}", id, device.name());

        let handle =
            AudioResourceHandle::acquire(device, &config.constraints, config.analyser.clone()).await?;

        Ok(Self {
            id,
            detector: SilenceDetector::new(config.silence_threshold, config.silence_grace),
            config,
            handle,
            fragments: Vec::new(),
            pending: Vec::new(),
            started_at: None,
            ended_at: None,
            started_wall: Utc::now(),
            capturing: false,
            ended: false,
            stop_reason: None,
        })
    }

    /// Start capturing
    pub fn begin(&mut self) -> Result<(), TurnError> {
        if self.ended {
            return Err(TurnError::DeviceUnavailable(format!(
                "session {} has already ended",
                self.id
            )));
        }
        if self.capturing {
            return Ok(());
        }

        self.handle.connect()?;

        let now = Instant::now();
        self.started_at = Some(now);
        self.started_wall = Utc::now();
        self.detector.arm(now);
        self.capturing = true;

        info!("Recording session {} capturing", self.id);
        Ok(())
    }

    /// Capture until a stop signal arrives
    ///
    /// Whichever fires first wins: the explicit stop, the silence detector,
    /// the duration cap, or the stream ending. `on_tick` receives the elapsed
    /// capture time on every detector tick.
    pub async fn run<F>(&mut self, mut stop: oneshot::Receiver<()>, mut on_tick: F) -> StopReason
    where
        F: FnMut(Duration) + Send,
    {
        if !self.capturing {
            return self.stop_reason.unwrap_or(StopReason::Aborted);
        }

        let started = self.started_at.unwrap_or_else(Instant::now);

        let cap = tokio::time::sleep_until(started + self.config.max_duration);
        tokio::pin!(cap);

        let mut detector_tick = interval_at(started + self.config.silence_tick, self.config.silence_tick);
        detector_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut fragment_tick =
            interval_at(started + self.config.fragment_interval, self.config.fragment_interval);
        fragment_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;

                // A dropped sender counts as a user stop
                _ = &mut stop => break StopReason::User,

                _ = &mut cap => break StopReason::DurationCap,

                frame = self.handle.next_frame() => match frame {
                    Some(frame) => self.pending.extend_from_slice(&frame.samples),
                    None => break StopReason::StreamEnded,
                },

                _ = fragment_tick.tick() => self.cut_fragment(),

                now = detector_tick.tick() => {
                    let level = self.handle.level();
                    on_tick(now.saturating_duration_since(started));

                    if self.detector.observe(level, now) == SilenceVerdict::Exceeded {
                        break StopReason::Silence;
                    }
                }
            }
        };

        info!(
            "Recording session {} stop signal: {:?} after {:.1}s",
            self.id,
            reason,
            self.elapsed().as_secs_f64()
        );

        self.stop_reason = Some(reason);
        reason
    }

    /// Stop capture, assemble the payload and release every resource
    ///
    /// Returns the recording on the first call and `None` afterwards.
    pub fn end(&mut self) -> Option<Recording> {
        if self.ended {
            return None;
        }
        self.ended = true;
        self.detector.disarm();

        if self.capturing {
            // Frames captured before the stop are still part of the recording
            for frame in self.handle.drain() {
                self.pending.extend_from_slice(&frame.samples);
            }
            self.cut_fragment();
            self.capturing = false;
            self.ended_at = Some(Instant::now());
        }

        self.handle.release();

        let constraints = &self.config.constraints;
        let payload = AudioPayload::assemble(&self.fragments, constraints.sample_rate, constraints.channels);
        let reason = self.stop_reason.unwrap_or(StopReason::Aborted);
        let duration = self.elapsed();

        let stats = RecordingStats {
            session_id: self.id,
            started_at: self.started_wall,
            duration_secs: duration.as_secs_f64(),
            fragment_count: self.fragments.len(),
            payload_bytes: payload.len(),
            stop_reason: reason,
        };

        info!(
            "Recording session {} ended: {:?}, {:.1}s, {} fragments, {} bytes",
            self.id,
            reason,
            stats.duration_secs,
            stats.fragment_count,
            stats.payload_bytes
        );

        Some(Recording {
            payload,
            reason,
            duration,
            stats,
        })
    }

    fn cut_fragment(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let sequence = self.fragments.len() as u64;
        let captured_at_ms = self.elapsed().as_millis() as u64;
        let fragment = Fragment::from_samples(sequence, &self.pending, captured_at_ms);
        self.pending.clear();

        debug!(
            "Session {} fragment {} ({} bytes)",
            self.id,
            fragment.sequence,
            fragment.len()
        );
        self.fragments.push(fragment);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Capture time so far (frozen once the session ends)
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Hardware resources still held (zero after `end`)
    pub fn outstanding_resources(&self) -> usize {
        self.handle.outstanding()
    }
}
