//! Voice sessions
//!
//! A [`VoiceSession`] is a handle to one joined voice channel. All of the
//! session's state (turn state, chat history, playback queue, capture
//! listeners) lives in a single task that processes [`SessionEvent`]s one
//! at a time. Network calls run in spawned tasks that report back as events,
//! so nothing slow ever holds the session.

mod capture;
mod state;
mod task;
mod transcript;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

pub use capture::{CaptureManager, CapturePolicy, CaptureSession, UtteranceSink, listen};
pub use state::{ConversationState, SessionMode, TurnState};
pub use transcript::TranscriptLog;

use crate::agent::{MediaSearch, ResponseGenerator, WebSearch};
use crate::alarm::{AlarmKind, AlarmRegistry};
use crate::intent::IntentRouter;
use crate::playback::{Earcons, Played, RetryPolicy};
use crate::voice::{ParticipantId, Synthesizer, Transcriber, Utterance, VoiceConverter, VoiceLink};
use crate::{Error, Result};

/// Participant used for commands typed in a text channel
pub const TEXT_PARTICIPANT: &str = "text";

/// External services a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Applied to synthesized audio when present
    pub converter: Option<Arc<dyn VoiceConverter>>,
    pub web_search: Option<Arc<dyn WebSearch>>,
    pub media_search: Option<Arc<dyn MediaSearch>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("converter", &self.converter.is_some())
            .field("web_search", &self.web_search.is_some())
            .field("media_search", &self.media_search.is_some())
            .finish_non_exhaustive()
    }
}

/// Tunables shared by every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub capture: CapturePolicy,
    /// Maximum words per synthesized chunk
    pub chunk_words: usize,
    pub retry: RetryPolicy,
    /// Chat history bound per participant
    pub memory_size: usize,
    pub system_prompt: String,
    pub speech_volume: f32,
    pub alarm_volume: f32,
    /// Times an alarm sound repeats unless stopped
    pub alarm_repeats: u32,
    pub earcons: Arc<Earcons>,
    pub transcript_dir: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capture: CapturePolicy::default(),
            chunk_words: 60,
            retry: RetryPolicy::default(),
            memory_size: 20,
            system_prompt: String::new(),
            speech_volume: 1.0,
            alarm_volume: 0.8,
            alarm_repeats: 5,
            earcons: Arc::new(Earcons::default()),
            transcript_dir: PathBuf::from("transcripts"),
        }
    }
}

/// Everything sessions share: collaborators, settings, router and alarms
#[derive(Debug, Clone)]
pub struct SessionServices {
    pub collaborators: Collaborators,
    pub settings: SessionSettings,
    pub router: Arc<IntentRouter>,
    /// Process-wide; alarms outlive the session that set them
    pub alarms: AlarmRegistry,
}

/// Point-in-time view of a session, for status output and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConversationState,
    pub mode: SessionMode,
    /// Participants with chat history
    pub history_participants: usize,
    pub alarm_ringing: bool,
    pub media_playing: bool,
    /// Chunks of the current response not yet played
    pub pending_chunks: usize,
}

/// Requests from outside the session task
#[derive(Debug)]
pub enum SessionCommand {
    /// Applies even while a turn is running
    ResetHistory,
    /// `accepted` is false when the request was discarded as busy
    PlayMedia {
        query: String,
        accepted: oneshot::Sender<bool>,
    },
    Search {
        query: String,
        accepted: oneshot::Sender<bool>,
    },
    ParticipantJoined(ParticipantId),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Leave(oneshot::Sender<Option<String>>),
}

/// Everything the session task reacts to
#[derive(Debug)]
pub enum SessionEvent {
    /// Capture finished an utterance
    Utterance(Utterance),
    /// Transcription finished; `None` on failure
    Transcribed {
        participant: ParticipantId,
        text: Option<String>,
    },
    /// Generator (or search + generator) answered
    Generated {
        response: u64,
        participant: ParticipantId,
        query: String,
        reply: Result<String>,
        /// Commit the exchange to chat history
        remember: bool,
    },
    /// Media search answered
    MediaFound {
        response: u64,
        participant: ParticipantId,
        query: String,
        found: Result<Option<String>>,
    },
    /// One chunk's synthesis (and conversion) finished
    Synthesized {
        response: u64,
        index: usize,
        audio: Result<Vec<u8>>,
    },
    /// The speaker finished a clip
    Played(Played),
    /// Backoff interval elapsed while waiting for a chunk
    BackoffTick { response: u64 },
    AlarmFired(AlarmKind),
    /// Spoken alarm announcement ready; `ring` identifies the firing
    AlarmVoiced { ring: u64, audio: Result<Vec<u8>> },
    Command(SessionCommand),
}

/// Handle to a running session
#[derive(Clone)]
pub struct VoiceSession {
    name: String,
    mode: SessionMode,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<ConversationState>,
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}

impl VoiceSession {
    /// Start the session task and begin listening to current participants
    pub async fn start(
        name: impl Into<String>,
        mode: SessionMode,
        link: Arc<dyn VoiceLink>,
        services: SessionServices,
    ) -> Self {
        let name = name.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConversationState::Idle);

        let session = task::SessionTask::new(
            name.clone(),
            mode,
            link,
            services,
            events_tx.clone(),
            state_tx,
        )
        .await;
        tokio::spawn(session.run(events_rx));

        Self {
            name,
            mode,
            events: events_tx,
            state: state_rx,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Latest published conversation state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        *self.state.borrow()
    }

    /// Wait until the conversation state satisfies `predicate`
    ///
    /// # Errors
    ///
    /// Returns error if the session ends first
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&ConversationState) -> bool,
    ) -> Result<ConversationState> {
        let mut rx = self.state.clone();
        rx.wait_for(predicate)
            .await
            .map(|state| *state)
            .map_err(|_| Error::Channel(format!("session {} ended", self.name)))
    }

    /// Whether the session task is still running
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.events.is_closed()
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.events
            .send(SessionEvent::Command(command))
            .map_err(|_| Error::Channel(format!("session {} is closed", self.name)))
    }

    /// Forget every participant's chat history, even mid-turn
    ///
    /// # Errors
    ///
    /// Returns error if the session has ended
    pub fn reset_history(&self) -> Result<()> {
        self.send(SessionCommand::ResetHistory)
    }

    /// Look up and play media, as if it had been asked for by voice
    ///
    /// Returns false when the session is busy and the request was discarded.
    ///
    /// # Errors
    ///
    /// Returns error if the session has ended
    pub async fn play_media(&self, query: impl Into<String>) -> Result<bool> {
        let (accepted, rx) = oneshot::channel();
        self.send(SessionCommand::PlayMedia {
            query: query.into(),
            accepted,
        })?;
        self.answer(rx).await
    }

    /// Answer a question from web search results
    ///
    /// Returns false when the session is busy and the request was discarded.
    ///
    /// # Errors
    ///
    /// Returns error if the session has ended
    pub async fn search(&self, query: impl Into<String>) -> Result<bool> {
        let (accepted, rx) = oneshot::channel();
        self.send(SessionCommand::Search {
            query: query.into(),
            accepted,
        })?;
        self.answer(rx).await
    }

    async fn answer<T>(&self, rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| Error::Channel(format!("session {} ended", self.name)))
    }

    /// Start listening to someone who joined the channel
    ///
    /// # Errors
    ///
    /// Returns error if the session has ended
    pub fn participant_joined(&self, participant: ParticipantId) -> Result<()> {
        self.send(SessionCommand::ParticipantJoined(participant))
    }

    /// # Errors
    ///
    /// Returns error if the session has ended
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx))?;
        self.answer(rx).await
    }

    /// Tear the session down; returns the transcript for transcribing sessions
    ///
    /// # Errors
    ///
    /// Returns error if the session has already ended
    pub async fn leave(&self) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Leave(tx))?;
        self.answer(rx).await
    }
}
