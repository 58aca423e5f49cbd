use std::time::Duration;
use tokio::time::Instant;

/// Result of one detector sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceVerdict {
    /// Level above threshold; the silence clock was reset
    Sound,
    /// Below threshold but still within the grace period
    Quiet { silent_for: Duration },
    /// Grace period exceeded. Reported once, then the detector goes inert.
    Exceeded,
    /// Not armed; samples are ignored
    Inert,
}

/// Decides when the speaker has stopped talking
///
/// Only raises the signal. Teardown is up to whoever owns the session.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    grace: Duration,
    last_sound_at: Option<Instant>,
    armed: bool,
}

impl SilenceDetector {
    pub fn new(threshold: f32, grace: Duration) -> Self {
        Self {
            threshold,
            grace,
            last_sound_at: None,
            armed: false,
        }
    }

    /// Start watching; capture beginning counts as the last sound
    pub fn arm(&mut self, now: Instant) {
        self.last_sound_at = Some(now);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn last_sound_at(&self) -> Option<Instant> {
        self.last_sound_at
    }

    pub fn observe(&mut self, level: f32, now: Instant) -> SilenceVerdict {
        if !self.armed {
            return SilenceVerdict::Inert;
        }

        let last = *self.last_sound_at.get_or_insert(now);

        if level > self.threshold {
            // Never move backwards
            if now > last {
                self.last_sound_at = Some(now);
            }
            return SilenceVerdict::Sound;
        }

        let silent_for = now.saturating_duration_since(last);
        if silent_for > self.grace {
            self.armed = false;
            return SilenceVerdict::Exceeded;
        }

        SilenceVerdict::Quiet { silent_for }
    }
}
