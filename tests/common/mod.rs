//! Shared test utilities: a counting microphone, scripted collaborators and a mock speaker
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use loqa_voice::audio::{AudioDevice, AudioFrame, AudioPayload, CaptureConstraints, InputStream, SpeechAudio};
use loqa_voice::playback::{AudioSink, PlaybackGate};
use loqa_voice::turn::{
    Assistant, AssistantReply, Collaborators, ConversationHandle, InMemoryConversationLog,
    SpeechSynthesizer, Transcriber, TurnConfig, TurnController, TurnState,
};
use loqa_voice::TurnError;

pub const FRAME_SAMPLES: usize = 1600;
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// 100ms of broadband noise at 16kHz, loud enough to count as speech
pub fn speech_frame(seed: u32) -> AudioFrame {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let samples = (0..FRAME_SAMPLES)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
            (unit * 0.5 * 32767.0) as i16
        })
        .collect();

    AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: seed as u64 * 100,
    }
}

pub fn silent_frame() -> AudioFrame {
    AudioFrame {
        samples: vec![0; FRAME_SAMPLES],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    }
}

pub fn frame_bytes(frames: &[AudioFrame]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|f| f.samples.iter().flat_map(|s| s.to_le_bytes()))
        .collect()
}

// ============================================================================
// Microphone
// ============================================================================

/// Counts every acquisition and release made through a `MockMicrophone`
#[derive(Default)]
pub struct DeviceProbe {
    pub opened: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

impl DeviceProbe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Streams acquired and not yet released
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub enum MicScript {
    /// Deliver these frames, then silent frames (unpaced: nothing more)
    Frames(Vec<AudioFrame>),
    /// Open but never delivers anything, like a muted track
    Quiet,
    /// Deliver these frames, then end the stream
    FramesThenEnd(Vec<AudioFrame>),
    /// Speech frames forever
    Endless,
    /// Platform refuses access
    Deny,
    /// No device
    Unavailable,
    /// Opens but cannot start
    FailOnStart,
}

pub struct MockMicrophone {
    script: MicScript,
    /// Delay between frames; `None` delivers everything at once
    pace: Option<Duration>,
    /// Refuse permission this many times before granting
    denials: AtomicUsize,
    pub probe: Arc<DeviceProbe>,
}

impl MockMicrophone {
    pub fn new(script: MicScript) -> Self {
        Self {
            script,
            pace: Some(Duration::from_millis(100)),
            denials: AtomicUsize::new(0),
            probe: Arc::new(DeviceProbe::default()),
        }
    }

    pub fn with_pace(mut self, pace: Option<Duration>) -> Self {
        self.pace = pace;
        self
    }

    /// Deny the first `count` opens, then behave as scripted
    pub fn denying_first(self, count: usize) -> Self {
        self.denials.store(count, Ordering::SeqCst);
        self
    }

    pub fn speaking(frames: usize) -> Self {
        Self::new(MicScript::Frames((0..frames as u32).map(speech_frame).collect()))
    }

    pub fn silent() -> Self {
        Self::new(MicScript::Quiet)
    }
}

#[async_trait]
impl AudioDevice for MockMicrophone {
    async fn open(&self, _constraints: &CaptureConstraints) -> Result<Box<dyn InputStream>, TurnError> {
        // Acquisition is a suspension point
        tokio::task::yield_now().await;

        let denied = self
            .denials
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if denied {
            return Err(TurnError::PermissionDenied("NotAllowedError".to_string()));
        }

        match &self.script {
            MicScript::Deny => {
                return Err(TurnError::PermissionDenied("NotAllowedError".to_string()))
            }
            MicScript::Unavailable => {
                return Err(TurnError::DeviceUnavailable("no input device".to_string()))
            }
            _ => {}
        }

        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MockStream {
            script: self.script.clone(),
            pace: self.pace,
            probe: self.probe.clone(),
            task: None,
            held: None,
            capturing: false,
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "mock-microphone"
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tail {
    Silence,
    Speech,
    Nothing,
    End,
}

struct MockStream {
    script: MicScript,
    pace: Option<Duration>,
    probe: Arc<DeviceProbe>,
    task: Option<JoinHandle<()>>,
    /// Keeps an unpaced stream open
    held: Option<mpsc::Sender<AudioFrame>>,
    capturing: bool,
    released: bool,
}

impl InputStream for MockStream {
    fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, TurnError> {
        let (frames, tail) = match &self.script {
            MicScript::FailOnStart => {
                return Err(TurnError::DeviceUnavailable("stream failed to start".to_string()))
            }
            MicScript::Frames(frames) => (frames.clone(), Tail::Silence),
            MicScript::FramesThenEnd(frames) => (frames.clone(), Tail::End),
            MicScript::Quiet => (Vec::new(), Tail::Nothing),
            MicScript::Endless => (Vec::new(), Tail::Speech),
            MicScript::Deny | MicScript::Unavailable => unreachable!("never opened"),
        };

        self.probe.started.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;

        let (tx, rx) = mpsc::channel(frames.len().max(1) + 64);

        let pace = match self.pace {
            Some(pace) if tail != Tail::Nothing => pace,
            _ => {
                for frame in frames {
                    tx.try_send(frame).expect("channel sized for script");
                }
                if tail != Tail::End {
                    self.held = Some(tx);
                }
                return Ok(rx);
            }
        };

        self.task = Some(tokio::spawn(async move {
            for frame in frames {
                if tx.send(frame).await.is_err() {
                    return;
                }
                tokio::time::sleep(pace).await;
            }

            let mut seed = 0;
            loop {
                let frame = match tail {
                    Tail::End | Tail::Nothing => return,
                    Tail::Silence => silent_frame(),
                    Tail::Speech => speech_frame(seed),
                };
                if tx.send(frame).await.is_err() {
                    return;
                }
                seed += 1;
                tokio::time::sleep(pace).await;
            }
        }));

        Ok(rx)
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.capturing = false;

        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.held = None;

        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Collaborators
// ============================================================================

pub struct MockTranscriber {
    results: Mutex<VecDeque<Result<String, TurnError>>>,
    pub calls: AtomicUsize,
    pub last_payload_len: AtomicUsize,
    panics: bool,
}

impl MockTranscriber {
    pub fn returning(text: &str) -> Self {
        Self::scripted(vec![Ok(text.to_string())])
    }

    /// Results are used in order; the last one repeats
    pub fn scripted(results: Vec<Result<String, TurnError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
            last_payload_len: AtomicUsize::new(0),
            panics: false,
        }
    }

    /// Panics instead of answering, like a buggy backend
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::returning("unused")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, payload: &AudioPayload) -> Result<String, TurnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_payload_len.store(payload.len(), Ordering::SeqCst);
        if self.panics {
            panic!("transcriber backend crashed");
        }
        next_result(&self.results)
    }
}

pub struct MockAssistant {
    reply: Result<String, TurnError>,
    handle: String,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<(String, Option<ConversationHandle>)>>,
}

impl MockAssistant {
    pub fn replying(text: &str, handle: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            handle: handle.to_string(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: TurnError) -> Self {
        Self {
            reply: Err(err),
            handle: String::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Option<ConversationHandle>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Assistant for MockAssistant {
    async fn exchange(
        &self,
        text: &str,
        handle: Option<&ConversationHandle>,
    ) -> Result<AssistantReply, TurnError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), handle.cloned()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = self.reply.clone()?;
        let handle = handle
            .cloned()
            .unwrap_or_else(|| ConversationHandle::new(self.handle.clone()));
        Ok(AssistantReply { text, handle })
    }
}

pub struct MockSynthesizer {
    fail: bool,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SpeechAudio, TurnError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));

        if self.fail {
            return Err(TurnError::SynthesisFailed("tts unavailable".to_string()));
        }
        Ok(SpeechAudio::new(vec![0xFF, 0xFB, 0x90, 0x00], "audio/mpeg"))
    }
}

fn next_result<T: Clone>(results: &Mutex<VecDeque<Result<T, TurnError>>>) -> Result<T, TurnError> {
    let mut results = results.lock().unwrap();
    if results.len() > 1 {
        results.pop_front().unwrap()
    } else {
        results.front().cloned().expect("scripted result")
    }
}

// ============================================================================
// Speaker
// ============================================================================

pub struct MockSink {
    fail_prime: AtomicUsize,
    refuse_play: bool,
    play_time: Duration,
    pub primed: AtomicUsize,
    pub played: AtomicUsize,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            fail_prime: AtomicUsize::new(0),
            refuse_play: false,
            play_time: Duration::from_millis(500),
            primed: AtomicUsize::new(0),
            played: AtomicUsize::new(0),
        }
    }

    /// Autoplay is blocked; every play is refused
    pub fn refusing() -> Self {
        Self {
            refuse_play: true,
            ..Self::new()
        }
    }

    /// The first `count` unlock attempts fail
    pub fn failing_prime(count: usize) -> Self {
        let sink = Self::new();
        sink.fail_prime.store(count, Ordering::SeqCst);
        sink
    }

    pub fn primed(&self) -> usize {
        self.primed.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for MockSink {
    async fn prime(&self) -> Result<(), TurnError> {
        tokio::task::yield_now().await;

        let failed = self
            .fail_prime
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TurnError::PlaybackFailed("NotAllowedError".to_string()));
        }

        self.primed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn play(&self, _audio: &SpeechAudio) -> Result<(), TurnError> {
        if self.refuse_play {
            return Err(TurnError::PlaybackFailed("autoplay blocked".to_string()));
        }

        tokio::time::sleep(self.play_time).await;
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-sink"
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A controller wired to mocks, with handles to inspect each of them
pub struct Harness {
    pub controller: TurnController,
    pub probe: Arc<DeviceProbe>,
    pub transcriber: Arc<MockTranscriber>,
    pub assistant: Arc<MockAssistant>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub sink: Arc<MockSink>,
    pub log: Arc<InMemoryConversationLog>,
}

pub struct HarnessBuilder {
    mic: MockMicrophone,
    transcriber: MockTranscriber,
    assistant: MockAssistant,
    synthesizer: MockSynthesizer,
    sink: MockSink,
    config: TurnConfig,
}

impl HarnessBuilder {
    pub fn mic(mut self, mic: MockMicrophone) -> Self {
        self.mic = mic;
        self
    }

    pub fn transcriber(mut self, transcriber: MockTranscriber) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn assistant(mut self, assistant: MockAssistant) -> Self {
        self.assistant = assistant;
        self
    }

    pub fn synthesizer(mut self, synthesizer: MockSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn sink(mut self, sink: MockSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Harness {
        let probe = self.mic.probe.clone();
        let transcriber = Arc::new(self.transcriber);
        let assistant = Arc::new(self.assistant);
        let synthesizer = Arc::new(self.synthesizer);
        let sink = Arc::new(self.sink);
        let log = Arc::new(InMemoryConversationLog::new());

        let collaborators = Collaborators {
            transcriber: transcriber.clone(),
            assistant: assistant.clone(),
            synthesizer: synthesizer.clone(),
            log: log.clone(),
        };
        let playback = Arc::new(PlaybackGate::new(sink.clone()));

        let controller = TurnController::new(Arc::new(self.mic), collaborators, playback, self.config);

        Harness {
            controller,
            probe,
            transcriber,
            assistant,
            synthesizer,
            sink,
            log,
        }
    }
}

impl Harness {
    /// Speaking microphone, "hello" → "hi there" on conv-1
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            mic: MockMicrophone::speaking(3),
            transcriber: MockTranscriber::returning("hello"),
            assistant: MockAssistant::replying("hi there", "conv-1"),
            synthesizer: MockSynthesizer::new(),
            sink: MockSink::new(),
            config: TurnConfig::default(),
        }
    }
}

/// Every state received so far, prefixed with the initial `Idle`
pub fn observed(states: &mut tokio::sync::broadcast::Receiver<TurnState>) -> Vec<TurnState> {
    let mut seen = vec![TurnState::Idle];
    while let Ok(state) = states.try_recv() {
        seen.push(state);
    }
    seen
}
