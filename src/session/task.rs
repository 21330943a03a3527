//! The per-session event loop

use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

use super::capture::{CaptureManager, UtteranceSink};
use super::state::{ConversationState, SessionMode, TurnState};
use super::transcript::TranscriptLog;
use super::{
    Collaborators, SessionCommand, SessionEvent, SessionServices, SessionSettings,
    SessionSnapshot, TEXT_PARTICIPANT,
};
use crate::Error;
use crate::agent::{ChatHistory, ChatMessage, is_declined, search_prompt};
use crate::alarm::{AlarmKind, AlarmRegistry, describe_pending, describe_scheduled, resolve_delay};
use crate::intent::{Intent, IntentRouter, RouteContext};
use crate::playback::{Cue, Earcon, PlaybackQueue, Played, Speaker, Step, Tick, segment};
use crate::voice::{
    AudioClip, ParticipantId, Synthesizer, Utterance, VoiceConverter, VoiceLink,
};

const APOLOGY: &str = "Sorry, something went wrong while I was thinking about that.";
const ASSISTANT_SPEAKER: &str = "assistant";

/// Session context: owned by exactly one task
pub(super) struct SessionTask {
    name: String,
    mode: SessionMode,
    link: Arc<dyn VoiceLink>,
    collab: Collaborators,
    settings: SessionSettings,
    router: Arc<IntentRouter>,
    alarms: AlarmRegistry,
    events: mpsc::UnboundedSender<SessionEvent>,
    state_tx: watch::Sender<ConversationState>,

    turn: TurnState,
    turn_participant: Option<ParticipantId>,
    turn_tasks: Vec<AbortHandle>,
    history: ChatHistory,
    capture: CaptureManager,
    speaker: Speaker,
    queue: Option<PlaybackQueue<AudioClip>>,
    chunk_text: Vec<String>,
    backoff_for: Option<u64>,

    alarm_ringing: bool,
    /// Bumped on every firing and every stop; stale announcements are dropped
    alarm_ring: u64,
    alarm_clip: Option<AudioClip>,
    rings_left: u32,
    media_playing: bool,
    transcript: Option<TranscriptLog>,
}

impl SessionTask {
    pub(super) async fn new(
        name: String,
        mode: SessionMode,
        link: Arc<dyn VoiceLink>,
        services: SessionServices,
        events: mpsc::UnboundedSender<SessionEvent>,
        state_tx: watch::Sender<ConversationState>,
    ) -> Self {
        let SessionServices {
            collaborators,
            settings,
            router,
            alarms,
        } = services;

        let sink_tx = events.clone();
        let sink: UtteranceSink = Arc::new(move |utterance: Utterance| {
            let _ = sink_tx.send(SessionEvent::Utterance(utterance));
        });
        let mut capture = CaptureManager::new(Arc::clone(&link), settings.capture, sink);

        let played_tx = events.clone();
        let speaker = Speaker::spawn(
            Arc::clone(&link),
            Arc::new(move |played: Played| {
                let _ = played_tx.send(SessionEvent::Played(played));
            }),
        );

        for participant in link.participants() {
            if let Err(e) = capture.ensure_listening(&participant).await {
                tracing::warn!(session = %name, participant = %participant, error = %e, "could not listen");
            }
        }

        let transcript = if mode.keeps_transcript() {
            match TranscriptLog::create(&settings.transcript_dir, &name).await {
                Ok(log) => Some(log),
                Err(e) => {
                    tracing::warn!(session = %name, error = %e, "transcript unavailable");
                    None
                }
            }
        } else {
            None
        };

        let history = ChatHistory::new(settings.system_prompt.clone(), settings.memory_size);

        Self {
            name,
            mode,
            link,
            collab: collaborators,
            settings,
            router,
            alarms,
            events,
            state_tx,
            turn: TurnState::default(),
            turn_participant: None,
            turn_tasks: Vec::new(),
            history,
            capture,
            speaker,
            queue: None,
            chunk_text: Vec::new(),
            backoff_for: None,
            alarm_ringing: false,
            alarm_ring: 0,
            alarm_clip: None,
            rings_left: 0,
            media_playing: false,
            transcript,
        }
    }

    pub(super) async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        tracing::info!(session = %self.name, mode = %self.mode, link = self.link.name(), "session started");

        while let Some(event) = events.recv().await {
            if self.handle(event).await.is_break() {
                break;
            }
        }

        tracing::info!(session = %self.name, "session ended");
    }

    async fn handle(&mut self, event: SessionEvent) -> ControlFlow<()> {
        match event {
            SessionEvent::Utterance(utterance) => self.transcribe(utterance),
            SessionEvent::Transcribed { participant, text } => {
                return self.on_transcribed(participant, text).await;
            }
            SessionEvent::Generated {
                response,
                participant,
                query,
                reply,
                remember,
            } => {
                self.on_generated(response, participant, &query, reply, remember)
                    .await;
            }
            SessionEvent::MediaFound {
                response,
                participant,
                query,
                found,
            } => self.on_media_found(response, &participant, &query, found).await,
            SessionEvent::Synthesized {
                response,
                index,
                audio,
            } => self.on_synthesized(response, index, audio).await,
            SessionEvent::Played(played) => self.on_played(played).await,
            SessionEvent::BackoffTick { response } => self.on_backoff(response).await,
            SessionEvent::AlarmFired(kind) => self.on_alarm(kind),
            SessionEvent::AlarmVoiced { ring, audio } => self.on_alarm_voiced(ring, audio),
            SessionEvent::Command(command) => return self.on_command(command).await,
        }
        ControlFlow::Continue(())
    }

    async fn on_command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        let text_user = ParticipantId::new(TEXT_PARTICIPANT);
        match command {
            SessionCommand::ResetHistory => {
                self.history.clear();
                tracing::info!(session = %self.name, state = %self.turn.get(), "chat history cleared");
            }
            SessionCommand::PlayMedia { query, accepted } => {
                let _ = accepted.send(self.turn.get().is_idle());
                return self.dispatch(text_user, Intent::PlayMedia(query)).await;
            }
            SessionCommand::Search { query, accepted } => {
                let _ = accepted.send(self.turn.get().is_idle());
                return self.dispatch(text_user, Intent::SearchQuery(query)).await;
            }
            SessionCommand::ParticipantJoined(participant) => {
                if let Err(e) = self.capture.ensure_listening(&participant).await {
                    tracing::warn!(session = %self.name, participant = %participant, error = %e, "could not listen");
                }
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Leave(reply) => {
                let transcript = self.teardown().await;
                let _ = reply.send(transcript);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.turn.get(),
            mode: self.mode,
            history_participants: self.history.len(),
            alarm_ringing: self.alarm_ringing,
            media_playing: self.media_playing,
            pending_chunks: self
                .queue
                .as_ref()
                .map_or(0, |q| q.len().saturating_sub(q.cursor())),
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.turn.get());
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.turn_tasks.retain(|t| !t.is_finished());
        self.turn_tasks.push(task.abort_handle());
    }

    fn earcon(&self, earcon: Earcon) {
        if !self.mode.plays_earcons() {
            return;
        }
        if let Some(clip) = self.settings.earcons.get(earcon) {
            self.speaker
                .enqueue(clip, self.settings.speech_volume, Cue::Earcon);
        }
    }

    async fn log_line(&mut self, speaker: &str, text: &str) {
        if let Some(log) = &mut self.transcript
            && let Err(e) = log.append(speaker, text).await
        {
            tracing::warn!(session = %self.name, error = %e, "transcript write failed");
        }
    }

    // --- listening ---

    fn transcribe(&self, utterance: Utterance) {
        let transcriber = Arc::clone(&self.collab.transcriber);
        let events = self.events.clone();
        tokio::spawn(async move {
            let participant = utterance.participant.clone();
            let text = match transcriber.transcribe(&utterance).await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!(participant = %participant, error = %e, "transcription failed");
                    None
                }
            };
            // Release the audio before reporting back
            drop(utterance);
            let _ = events.send(SessionEvent::Transcribed { participant, text });
        });
    }

    async fn on_transcribed(
        &mut self,
        participant: ParticipantId,
        text: Option<String>,
    ) -> ControlFlow<()> {
        let Some(text) = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
        else {
            tracing::debug!(participant = %participant, "nothing transcribed");
            return ControlFlow::Continue(());
        };

        self.log_line(participant.as_str(), &text).await;

        let ctx = RouteContext {
            interruptible: !self.turn.get().is_idle() || self.alarm_ringing || self.media_playing,
            trigger_free: self.mode.is_trigger_free(),
        };
        let intent = self.router.classify(&text, ctx);
        tracing::debug!(participant = %participant, intent = %intent, text = %text, "classified");

        self.dispatch(participant, intent).await
    }

    async fn dispatch(&mut self, participant: ParticipantId, intent: Intent) -> ControlFlow<()> {
        match intent {
            Intent::Noise | Intent::Unaddressed => {
                tracing::debug!(participant = %participant, intent = %intent, "ignored");
            }
            Intent::StopPlayback => self.stop().await,
            _ if !self.turn.get().is_idle() => {
                tracing::info!(
                    session = %self.name,
                    participant = %participant,
                    state = %self.turn.get(),
                    "discarding utterance while busy"
                );
            }
            Intent::LeaveSession => {
                self.earcon(Earcon::Command);
                self.teardown().await;
                return ControlFlow::Break(());
            }
            Intent::ResetHistory => {
                self.history.clear();
                self.earcon(Earcon::Command);
                tracing::info!(session = %self.name, "chat history cleared");
            }
            Intent::PlayMedia(query) => self.play_media(participant, query).await,
            Intent::ScheduleTimer { query, kind } => {
                self.schedule_alarm(&participant, &query, kind).await;
            }
            Intent::CancelTimer(index) => {
                self.earcon(Earcon::Command);
                let outcome = self.alarms.cancel(index);
                self.speak(Some(&participant), &outcome.announcement()).await;
            }
            Intent::ListTimers => {
                self.earcon(Earcon::Command);
                let listing = describe_pending(&self.alarms.list());
                self.speak(Some(&participant), &listing).await;
            }
            Intent::SearchQuery(query) => self.search(participant, query).await,
            Intent::AssistantQuery(text) => self.ask(participant, text),
        }
        ControlFlow::Continue(())
    }

    // --- turns ---

    fn begin_turn(&mut self, participant: Option<&ParticipantId>) -> Option<u64> {
        let response = self.turn.begin()?;
        self.turn_participant = participant.cloned();
        // The link does not report when media ends; a new turn takes over
        self.media_playing = false;
        self.publish_state();
        Some(response)
    }

    /// Speak `text` as a turn of its own; dropped if a turn is running
    async fn speak(&mut self, participant: Option<&ParticipantId>, text: &str) {
        let Some(response) = self.begin_turn(participant) else {
            tracing::debug!(session = %self.name, "busy, announcement dropped");
            return;
        };
        self.start_response(response, text).await;
    }

    async fn apologize_missing(&mut self, participant: &ParticipantId, what: &'static str) {
        let e = Error::ConfigurationMissing(what);
        tracing::warn!(session = %self.name, error = %e, "cannot serve request");
        self.speak(Some(participant), &format!("Sorry, {e}.")).await;
    }

    fn ask(&mut self, participant: ParticipantId, text: String) {
        let Some(response) = self.begin_turn(Some(&participant)) else {
            return;
        };
        self.earcon(Earcon::Understood);
        tracing::info!(session = %self.name, participant = %participant, response, "asking generator");

        let messages = self.history.preview_with(&participant, &text);
        let generator = Arc::clone(&self.collab.generator);
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let reply = generator.complete(&messages).await;
            let _ = events.send(SessionEvent::Generated {
                response,
                participant,
                query: text,
                reply,
                remember: true,
            });
        }));
    }

    async fn search(&mut self, participant: ParticipantId, query: String) {
        let Some(web) = self.collab.web_search.clone() else {
            self.apologize_missing(&participant, "web search").await;
            return;
        };
        let Some(response) = self.begin_turn(Some(&participant)) else {
            return;
        };
        self.earcon(Earcon::Understood);
        tracing::info!(session = %self.name, participant = %participant, response, query = %query, "searching");

        let generator = Arc::clone(&self.collab.generator);
        let system = self.settings.system_prompt.clone();
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let reply = async {
                let hits = web.search(&query).await?;
                let mut messages = Vec::with_capacity(2);
                if !system.is_empty() {
                    messages.push(ChatMessage::system(system));
                }
                messages.push(ChatMessage::user(search_prompt(&query, &hits)));
                generator.complete(&messages).await
            }
            .await;
            let _ = events.send(SessionEvent::Generated {
                response,
                participant,
                query,
                reply,
                remember: false,
            });
        }));
    }

    async fn on_generated(
        &mut self,
        response: u64,
        participant: ParticipantId,
        query: &str,
        reply: crate::Result<String>,
        remember: bool,
    ) {
        if !self.turn.is_current(response) {
            tracing::debug!(session = %self.name, response, "dropping stale reply");
            return;
        }

        match reply {
            Err(e) => {
                tracing::warn!(session = %self.name, response, error = %e, "generation failed");
                self.abort_turn();
                self.speak(Some(&participant), APOLOGY).await;
            }
            Ok(text) if is_declined(&text) => {
                tracing::info!(session = %self.name, response, "generator declined to answer");
                self.finish_turn(response).await;
            }
            Ok(text) => {
                if remember {
                    self.history.record_exchange(&participant, query, &text);
                }
                self.log_line(ASSISTANT_SPEAKER, &text).await;
                self.earcon(Earcon::Result);
                self.start_response(response, &text).await;
            }
        }
    }

    async fn play_media(&mut self, participant: ParticipantId, query: String) {
        let Some(media) = self.collab.media_search.clone() else {
            self.apologize_missing(&participant, "media search").await;
            return;
        };
        let Some(response) = self.begin_turn(Some(&participant)) else {
            return;
        };
        self.earcon(Earcon::Command);
        tracing::info!(session = %self.name, response, query = %query, "looking up media");

        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let found = media.find(&query).await;
            let _ = events.send(SessionEvent::MediaFound {
                response,
                participant,
                query,
                found,
            });
        }));
    }

    async fn on_media_found(
        &mut self,
        response: u64,
        participant: &ParticipantId,
        query: &str,
        found: crate::Result<Option<String>>,
    ) {
        if !self.turn.is_current(response) {
            tracing::debug!(session = %self.name, response, "dropping stale media result");
            return;
        }

        let failure = match found {
            Ok(Some(locator)) => match self.link.play_media(&locator).await {
                Ok(()) => {
                    tracing::info!(session = %self.name, locator = %locator, "media playing");
                    self.media_playing = true;
                    self.finish_turn(response).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(session = %self.name, error = %e, "media playback failed");
                    "Sorry, I can't play media here.".to_string()
                }
            },
            Ok(None) => format!("Sorry, I couldn't find anything for {query}."),
            Err(e) => {
                tracing::warn!(session = %self.name, error = %e, "media search failed");
                "Sorry, the media search failed.".to_string()
            }
        };

        self.abort_turn();
        self.speak(Some(participant), &failure).await;
    }

    // --- alarms ---

    async fn schedule_alarm(&mut self, participant: &ParticipantId, query: &str, kind: AlarmKind) {
        self.earcon(Earcon::Command);

        let announcement = match resolve_delay(query, kind, &Local::now()) {
            Ok(delay) => {
                let events = self.events.clone();
                let view = self.alarms.schedule(&self.name, kind, delay, move |kind| {
                    let _ = events.send(SessionEvent::AlarmFired(kind));
                });
                describe_scheduled(&view, delay)
            }
            Err(e) => {
                tracing::info!(session = %self.name, error = %e, "schedule not understood");
                format!("Sorry, I couldn't tell when to set that {kind} for.")
            }
        };

        self.speak(Some(participant), &announcement).await;
    }

    /// Ring regardless of the turn; speaks the alarm when there is no sound
    fn on_alarm(&mut self, kind: AlarmKind) {
        tracing::info!(session = %self.name, kind = %kind, state = %self.turn.get(), "alarm ringing");
        self.alarm_ring += 1;

        if let Some(clip) = self.settings.earcons.get(Earcon::Alarm) {
            self.ring(clip);
            return;
        }

        let ring = self.alarm_ring;
        let text = format!("Your {kind} is going off.");
        let synthesizer = Arc::clone(&self.collab.synthesizer);
        let converter = self.collab.converter.clone();
        let events = self.events.clone();
        // Not a turn task: finishing or aborting the turn must not silence it
        tokio::spawn(async move {
            let audio = voice(synthesizer, converter, &text).await;
            let _ = events.send(SessionEvent::AlarmVoiced { ring, audio });
        });
    }

    fn on_alarm_voiced(&mut self, ring: u64, audio: crate::Result<Vec<u8>>) {
        if ring != self.alarm_ring {
            tracing::debug!(session = %self.name, ring, "dropping silenced alarm announcement");
            return;
        }
        match audio {
            Ok(bytes) => self.ring(AudioClip::new(format!("alarm {ring}"), bytes)),
            Err(e) => {
                tracing::warn!(session = %self.name, error = %e, "alarm announcement synthesis failed");
            }
        }
    }

    fn ring(&mut self, clip: AudioClip) {
        self.alarm_ringing = true;
        self.rings_left = self.settings.alarm_repeats.saturating_sub(1);
        self.speaker
            .enqueue(clip.clone(), self.settings.alarm_volume, Cue::Alarm);
        self.alarm_clip = Some(clip);
    }

    fn ring_again(&mut self) {
        if !self.alarm_ringing {
            return;
        }
        let Some(clip) = self.alarm_clip.clone().filter(|_| self.rings_left > 0) else {
            self.alarm_ringing = false;
            self.alarm_clip = None;
            return;
        };
        self.rings_left -= 1;
        self.speaker
            .enqueue(clip, self.settings.alarm_volume, Cue::Alarm);
    }

    // --- playback ---

    async fn start_response(&mut self, response: u64, text: &str) {
        let chunks = segment(text, self.settings.chunk_words);
        if chunks.is_empty() {
            self.finish_turn(response).await;
            return;
        }

        tracing::info!(session = %self.name, response, chunks = chunks.len(), "synthesizing response");
        self.queue = Some(PlaybackQueue::new(response, chunks.len(), self.settings.retry));
        for (index, chunk) in chunks.iter().enumerate() {
            self.synthesize(response, index, chunk.clone());
        }
        self.chunk_text = chunks;
        self.arm_backoff(response);
    }

    fn synthesize(&mut self, response: u64, index: usize, text: String) {
        let synthesizer = Arc::clone(&self.collab.synthesizer);
        let converter = self.collab.converter.clone();
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            let audio = voice(synthesizer, converter, &text).await;
            let _ = events.send(SessionEvent::Synthesized {
                response,
                index,
                audio,
            });
        }));
    }

    async fn on_synthesized(&mut self, response: u64, index: usize, audio: crate::Result<Vec<u8>>) {
        let Some(queue) = self.queue.as_mut().filter(|q| q.response() == response) else {
            tracing::debug!(session = %self.name, response, index, "dropping stale chunk");
            return;
        };

        match audio {
            Ok(bytes) => queue.ready(
                index,
                AudioClip::new(format!("response {response} chunk {index}"), bytes),
            ),
            Err(e) => {
                tracing::warn!(session = %self.name, response, index, error = %e, "chunk synthesis failed");
                queue.failed(index);
            }
        }

        self.pump().await;
    }

    /// Move the queue forward as far as it can go right now
    async fn pump(&mut self) {
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        let response = queue.response();

        match queue.advance() {
            Step::Play { index, clip } => {
                if self.turn.speak(response) {
                    self.publish_state();
                }
                tracing::debug!(session = %self.name, response, index, "playing chunk");
                self.speaker.enqueue(
                    clip,
                    self.settings.speech_volume,
                    Cue::Chunk { response, index },
                );
            }
            Step::Wait => self.arm_backoff(response),
            Step::Playing => {}
            Step::Finished => {
                tracing::debug!(session = %self.name, response, "response played");
                self.queue = None;
                self.chunk_text.clear();
                self.finish_turn(response).await;
            }
        }
    }

    fn arm_backoff(&mut self, response: u64) {
        if self.backoff_for.is_some() {
            return;
        }
        self.backoff_for = Some(response);

        let backoff = self.settings.retry.backoff;
        let events = self.events.clone();
        self.track(tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = events.send(SessionEvent::BackoffTick { response });
        }));
    }

    async fn on_backoff(&mut self, response: u64) {
        if self.backoff_for != Some(response) {
            return;
        }
        self.backoff_for = None;

        let Some(queue) = self.queue.as_mut().filter(|q| q.response() == response) else {
            return;
        };

        match queue.tick() {
            Tick::Idle => {}
            Tick::Retry { index, attempt } => {
                tracing::debug!(session = %self.name, response, index, attempt, "waiting for chunk");
                self.arm_backoff(response);
            }
            Tick::Resynthesize { index, attempt } => {
                tracing::info!(session = %self.name, response, index, attempt, "retrying chunk synthesis");
                if let Some(text) = self.chunk_text.get(index).cloned() {
                    self.synthesize(response, index, text);
                }
                self.arm_backoff(response);
            }
            Tick::Abandon { index } => {
                tracing::warn!(session = %self.name, response, index, "retry budget exhausted, abandoning response");
                self.abort_turn();
                self.relisten().await;
                return;
            }
        }

        self.pump().await;
    }

    async fn on_played(&mut self, played: Played) {
        match played.cue {
            Cue::Chunk { response, index } => {
                if let Some(queue) = self.queue.as_mut().filter(|q| q.response() == response) {
                    queue.played(index);
                }
                self.pump().await;
            }
            Cue::Earcon => {}
            Cue::Alarm => self.ring_again(),
        }
    }

    // --- endings ---

    async fn finish_turn(&mut self, response: u64) {
        if self.turn.finish(response) {
            self.publish_state();
        }
        for task in self.turn_tasks.drain(..) {
            task.abort();
        }
        self.backoff_for = None;
        self.relisten().await;
    }

    /// Drop everything belonging to the current turn and go idle
    fn abort_turn(&mut self) {
        for task in self.turn_tasks.drain(..) {
            task.abort();
        }
        self.backoff_for = None;
        if let Some(queue) = self.queue.take() {
            tracing::debug!(
                session = %self.name,
                response = queue.response(),
                discarded = queue.len().saturating_sub(queue.cursor()),
                "playback queue cleared"
            );
        }
        self.chunk_text.clear();
        if self.turn.reset().is_some() {
            self.publish_state();
        }
    }

    /// Make sure the participant whose turn just ended is being heard
    async fn relisten(&mut self) {
        let Some(participant) = self.turn_participant.take() else {
            return;
        };
        if participant.as_str() == TEXT_PARTICIPANT {
            return;
        }
        if let Err(e) = self.capture.ensure_listening(&participant).await {
            tracing::warn!(session = %self.name, participant = %participant, error = %e, "could not restart capture");
        }
    }

    async fn stop(&mut self) {
        tracing::info!(session = %self.name, state = %self.turn.get(), "stop requested");
        self.abort_turn();
        self.speaker.stop();
        self.alarm_ringing = false;
        self.alarm_ring += 1;
        self.alarm_clip = None;
        self.rings_left = 0;
        self.media_playing = false;
        self.relisten().await;
    }

    async fn teardown(&mut self) -> Option<String> {
        self.abort_turn();
        self.speaker.stop();
        self.capture.shutdown();
        self.history.clear();

        let cancelled = self.alarms.cancel_owned_by(&self.name);
        if cancelled > 0 {
            tracing::info!(session = %self.name, cancelled, "cancelled alarms of departing session");
        }

        let transcript = self
            .transcript
            .take()
            .filter(|log| !log.is_empty())
            .map(|log| log.render());
        if let Some(text) = &transcript
            && let Err(e) = self
                .link
                .post_text(&format!("Transcript of {}:\n{text}", self.name))
                .await
        {
            tracing::warn!(session = %self.name, error = %e, "could not post transcript");
        }

        self.link.disconnect().await;
        tracing::info!(session = %self.name, "left voice channel");
        transcript
    }
}

/// Synthesize `text`, passing it through the voice converter when configured
async fn voice(
    synthesizer: Arc<dyn Synthesizer>,
    converter: Option<Arc<dyn VoiceConverter>>,
    text: &str,
) -> crate::Result<Vec<u8>> {
    let audio = synthesizer.synthesize(text).await?;
    match converter {
        Some(converter) => converter.convert(audio, converter.default_query()).await,
        None => Ok(audio),
    }
}
