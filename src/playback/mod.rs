//! Playback of synthesized speech
//!
//! Some platforms refuse to play audio that was not started from a user
//! gesture. `PlaybackGate::unlock` is the priming step a gesture handler runs
//! once; after that `play` may be called from anywhere.

mod gate;

pub use gate::{AudioSink, PlaybackGate};
