use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ports::{truncate_chars, Collaborators, ConversationHandle};
use super::state::{
    ConversationTurn, Notice, NoticeKind, PermissionState, Role, StartOutcome, TurnState,
};
use crate::audio::{AudioDevice, AudioPayload};
use crate::error::TurnError;
use crate::playback::PlaybackGate;
use crate::session::{RecordingSession, SessionConfig};

/// Tunables for the turn cycle
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Recording settings for each listening attempt
    pub session: SessionConfig,

    /// Ceiling on one assistant exchange
    /// Default: 60 seconds
    pub assistant_timeout: Duration,

    /// Reply text beyond this many characters is not spoken
    /// Default: 4000
    pub speech_char_limit: usize,

    /// Voice selector passed to speech synthesis
    pub voice: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            assistant_timeout: Duration::from_secs(60),
            speech_char_limit: 4000,
            voice: "nova".to_string(),
        }
    }
}

/// Internal phase; finer grained than the public `TurnState`
enum Phase {
    Idle,
    /// Microphone acquisition in flight. Reported as `Idle` but closes the guard.
    Acquiring,
    Listening {
        stop: Option<oneshot::Sender<()>>,
    },
    Thinking,
    Speaking,
}

impl Phase {
    fn state(&self) -> TurnState {
        match self {
            Phase::Idle | Phase::Acquiring => TurnState::Idle,
            Phase::Listening { .. } => TurnState::Listening,
            Phase::Thinking => TurnState::Thinking,
            Phase::Speaking => TurnState::Speaking,
        }
    }
}

struct Inner {
    phase: Phase,
    session_id: Option<Uuid>,
    elapsed: Duration,
    notice: Option<Notice>,
    permission: PermissionState,
    handle: Option<ConversationHandle>,
}

struct Shared {
    device: Arc<dyn AudioDevice>,
    collaborators: Collaborators,
    playback: Arc<PlaybackGate>,
    config: TurnConfig,
    inner: Mutex<Inner>,
    states: broadcast::Sender<TurnState>,
}

/// How a turn that got past listening ended
enum Completion {
    Spoke,
    NothingUnderstood,
}

/// Drives the voice turn: Idle → Listening → Thinking → Speaking → Idle
///
/// Owns at most one `RecordingSession` at a time and sequences the
/// transcription, assistant and speech collaborators. Every failure is
/// converted into a notice plus a return to `Idle`.
#[derive(Clone)]
pub struct TurnController {
    shared: Arc<Shared>,
}

impl TurnController {
    pub fn new(
        device: Arc<dyn AudioDevice>,
        collaborators: Collaborators,
        playback: Arc<PlaybackGate>,
        config: TurnConfig,
    ) -> Self {
        let (states, _) = broadcast::channel(32);

        Self {
            shared: Arc::new(Shared {
                device,
                collaborators,
                playback,
                config,
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    session_id: None,
                    elapsed: Duration::ZERO,
                    notice: None,
                    permission: PermissionState::Unknown,
                    handle: None,
                }),
                states,
            }),
        }
    }

    /// Begin listening (a user gesture)
    ///
    /// Ignored unless the controller is idle. Also unlocks playback, since the
    /// request comes from a user interaction.
    pub async fn start(&self) -> StartOutcome {
        self.shared.playback.unlock().await;

        {
            let mut inner = self.shared.lock();
            if !matches!(inner.phase, Phase::Idle) {
                info!("Start ignored while {}", inner.phase.state());
                return StartOutcome::Rejected;
            }
            inner.phase = Phase::Acquiring;
        }

        let config = self.shared.config.session.clone();
        let mut session = match RecordingSession::open(self.shared.device.as_ref(), config).await {
            Ok(session) => session,
            Err(e) => return self.shared.fail_start(e),
        };

        if let Err(e) = session.begin() {
            session.end();
            return self.shared.fail_start(e);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut inner = self.shared.lock();
            inner.permission = PermissionState::Granted;
            inner.session_id = Some(session.id());
            inner.elapsed = Duration::ZERO;
            self.shared.transition(
                &mut inner,
                Phase::Listening {
                    stop: Some(stop_tx),
                },
            );
        }

        tokio::spawn(drive(self.shared.clone(), session, stop_rx));
        StartOutcome::Listening
    }

    /// Deliver the user stop-signal
    ///
    /// Returns `true` only for the call that actually ended listening.
    pub fn stop(&self) -> bool {
        let mut inner = self.shared.lock();
        let stop = match &mut inner.phase {
            Phase::Listening { stop } => stop.take(),
            other => {
                debug!("Stop ignored while {}", other.state());
                return false;
            }
        };

        match stop {
            Some(tx) => {
                let delivered = tx.send(()).is_ok();
                if delivered {
                    info!("Stop requested by user");
                }
                delivered
            }
            None => false,
        }
    }

    pub fn state(&self) -> TurnState {
        self.shared.lock().phase.state()
    }

    /// Every state entered from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TurnState> {
        self.shared.states.subscribe()
    }

    /// Resolve once the controller is back at `Idle`
    pub async fn wait_until_idle(&self) {
        let mut states = self.subscribe();
        if self.state().is_idle() {
            return;
        }

        loop {
            match states.recv().await {
                Ok(TurnState::Idle) | Err(broadcast::error::RecvError::Closed) => return,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.state().is_idle() {
                        return;
                    }
                }
            }
        }
    }

    /// Seconds captured so far (zero when not listening)
    pub fn recording_elapsed_secs(&self) -> f64 {
        let inner = self.shared.lock();
        match inner.phase {
            Phase::Listening { .. } => inner.elapsed.as_secs_f64(),
            _ => 0.0,
        }
    }

    pub fn conversation(&self) -> Vec<ConversationTurn> {
        self.shared.collaborators.log.turns()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.shared.lock().notice.clone()
    }

    pub fn clear_notice(&self) {
        self.shared.lock().notice = None;
    }

    pub fn permission(&self) -> PermissionState {
        self.shared.lock().permission
    }

    pub fn conversation_handle(&self) -> Option<ConversationHandle> {
        self.shared.lock().handle.clone()
    }

    pub async fn unlock_playback(&self) {
        self.shared.playback.unlock().await;
    }

    pub fn playback_unlocked(&self) -> bool {
        self.shared.playback.is_unlocked()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`, logging and broadcasting the change
    fn transition(&self, inner: &mut Inner, next: Phase) {
        let from = inner.phase.state();
        let to = next.state();
        inner.phase = next;

        if from == to {
            return;
        }

        match inner.session_id {
            Some(id) => info!("Turn {} -> {} (session {})", from, to, id),
            None => info!("Turn {} -> {}", from, to),
        }

        // No subscribers is fine
        let _ = self.states.send(to);
    }

    fn fail_start(&self, err: TurnError) -> StartOutcome {
        let kind = err.notice_kind();
        let mut inner = self.lock();

        if matches!(err, TurnError::PermissionDenied(_)) {
            inner.permission = PermissionState::Denied;
        }
        error!("Could not start listening: {}", err);

        inner.notice = Some(Notice::new(kind));
        inner.phase = Phase::Idle;
        StartOutcome::Failed(kind)
    }

    fn set_elapsed(&self, elapsed: Duration) {
        self.lock().elapsed = elapsed;
    }

    fn enter(&self, next: Phase) {
        let mut inner = self.lock();
        self.transition(&mut inner, next);
    }

    /// Return to `Idle`, optionally surfacing a notice
    fn finish(&self, notice: Option<NoticeKind>) {
        let mut inner = self.lock();
        if let Some(kind) = notice {
            inner.notice = Some(Notice::new(kind));
        }
        self.transition(&mut inner, Phase::Idle);
        inner.session_id = None;
        inner.elapsed = Duration::ZERO;
    }

    fn fail(&self, err: TurnError) {
        if err.is_benign() {
            warn!("Turn ended without a reply: {}", err);
        } else {
            error!("Turn failed: {}", err);
        }
        self.finish(Some(err.notice_kind()));
    }

    /// Remember the conversation handle; it is never replaced once held
    fn keep_handle(&self, handle: ConversationHandle) {
        let mut inner = self.lock();
        match &inner.handle {
            None => {
                info!("Conversation handle acquired: {}", handle);
                inner.handle = Some(handle);
            }
            Some(current) if *current != handle => {
                warn!(
                    "Assistant returned handle {} but conversation {} is active, keeping it",
                    handle, current
                );
            }
            Some(_) => {}
        }
    }

    /// Thinking and Speaking, once a viable payload exists
    async fn respond(&self, payload: AudioPayload) -> Result<Completion, TurnError> {
        let transcript = self.collaborators.transcriber.transcribe(&payload).await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Ok(Completion::NothingUnderstood);
        }
        info!("Transcript: {}", transcript);

        let handle = self.lock().handle.clone();
        let exchange = self
            .collaborators
            .assistant
            .exchange(transcript, handle.as_ref());

        let reply = match tokio::time::timeout(self.config.assistant_timeout, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(TurnError::AssistantTimeout(
                    self.config.assistant_timeout.as_secs(),
                ))
            }
        };

        self.keep_handle(reply.handle);
        if reply.text.trim().is_empty() {
            return Err(TurnError::AssistantFailed("assistant replied with no text".to_string()));
        }

        self.collaborators.log.append(Role::User, transcript);
        self.collaborators.log.append(Role::Assistant, &reply.text);

        self.enter(Phase::Speaking);

        let spoken = truncate_chars(&reply.text, self.config.speech_char_limit);
        if spoken.len() < reply.text.len() {
            debug!(
                "Reply truncated to {} characters for speech",
                self.config.speech_char_limit
            );
        }

        let audio = self
            .collaborators
            .synthesizer
            .synthesize(spoken, &self.config.voice)
            .await?;
        self.playback.play(&audio).await?;

        Ok(Completion::Spoke)
    }
}

/// Runs one turn from an open session to the return to `Idle`
///
/// A panic anywhere in the turn still lands back at `Idle`.
async fn drive(shared: Arc<Shared>, session: RecordingSession, stop: oneshot::Receiver<()>) {
    let turn = AssertUnwindSafe(run_turn(shared.clone(), session, stop));

    if let Err(panic) = turn.catch_unwind().await {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Turn aborted by panic: {}", reason);
        shared.finish(Some(NoticeKind::Unexpected));
    }
}

async fn run_turn(shared: Arc<Shared>, mut session: RecordingSession, stop: oneshot::Receiver<()>) {
    let ticker = shared.clone();
    let reason = session
        .run(stop, move |elapsed| ticker.set_elapsed(elapsed))
        .await;
    debug!("Session {} stopped: {:?}", session.id(), reason);

    // Teardown completes before leaving Listening
    let recording = session.end();
    debug_assert_eq!(session.outstanding_resources(), 0);
    drop(session);

    let min_bytes = shared.config.session.min_payload_bytes;
    let payload = match recording {
        Some(recording) => recording.into_viable(min_bytes),
        None => Err(TurnError::DeviceUnavailable(
            "recording ended before it was collected".to_string(),
        )),
    };

    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => return shared.fail(e),
    };

    shared.enter(Phase::Thinking);

    match shared.respond(payload).await {
        Ok(Completion::Spoke) => shared.finish(None),
        Ok(Completion::NothingUnderstood) => {
            warn!("Transcript was empty, nothing understood");
            shared.finish(Some(NoticeKind::NothingUnderstood));
        }
        Err(e) => shared.fail(e),
    }
}
