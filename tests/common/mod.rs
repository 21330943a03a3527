//! Shared test utilities: scripted collaborators and a mock voice link

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use huddle::agent::{ChatMessage, MediaSearch, ResponseGenerator, SearchHit, WebSearch};
use huddle::alarm::AlarmRegistry;
use huddle::intent::{IntentRouter, PhraseBook};
use huddle::playback::{Earcons, RetryPolicy};
use huddle::session::{CapturePolicy, Collaborators, SessionServices, SessionSettings};
use huddle::voice::{
    AudioClip, AudioFrame, LinkFactory, ParticipantId, Synthesizer, Transcriber, Utterance,
    VoiceLink,
};
use huddle::{Error, Result};

/// Sample rate used by every mock stream
pub const TEST_RATE: u32 = 1_000;

/// Capture policy that ends an utterance after one silent frame
#[must_use]
pub fn test_capture() -> CapturePolicy {
    CapturePolicy {
        silence: Duration::from_millis(50),
        energy_threshold: 0.01,
        sample_rate: TEST_RATE,
        max_utterance: Duration::from_secs(5),
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Holds callers until the test opens it; starts open
#[derive(Default)]
pub struct Gate {
    closed: Mutex<bool>,
    opened: Notify,
}

impl Gate {
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }

    pub fn open(&self) {
        *self.closed.lock().unwrap() = false;
        self.opened.notify_waiters();
    }

    pub async fn pass(&self) {
        loop {
            let opened = self.opened.notified();
            if !*self.closed.lock().unwrap() {
                return;
            }
            opened.await;
        }
    }
}

/// Voice link whose participants are driven by the test
#[derive(Default)]
pub struct MockLink {
    participants: Vec<ParticipantId>,
    streams: Mutex<HashMap<ParticipantId, mpsc::Sender<AudioFrame>>>,
    played: Mutex<Vec<AudioClip>>,
    media: Mutex<Vec<String>>,
    posted: Mutex<Vec<String>>,
    stops: Mutex<usize>,
    disconnected: Mutex<bool>,
    play_time: Duration,
    stop: Notify,
}

impl MockLink {
    #[must_use]
    pub fn new(participants: &[&str]) -> Self {
        Self {
            participants: participants.iter().map(|p| ParticipantId::from(*p)).collect(),
            ..Self::default()
        }
    }

    /// Every clip takes `play_time` to play unless stopped
    #[must_use]
    pub fn with_play_time(mut self, play_time: Duration) -> Self {
        self.play_time = play_time;
        self
    }

    /// Send one voiced frame followed by silence, ending one utterance
    pub async fn say(&self, participant: &str) {
        let sender = {
            let streams = self.streams.lock().unwrap();
            streams.get(&ParticipantId::from(participant)).cloned()
        };
        let sender = sender.unwrap_or_else(|| panic!("{participant} is not being listened to"));

        sender.send(AudioFrame::new(vec![8_000; 100])).await.unwrap();
        sender.send(AudioFrame::new(vec![0; 100])).await.unwrap();
    }

    pub async fn wait_listening(&self, participant: &str) {
        let id = ParticipantId::from(participant);
        wait_until("listener", || {
            self.streams
                .lock()
                .unwrap()
                .get(&id)
                .is_some_and(|s| !s.is_closed())
        })
        .await;
    }

    /// Text of every clip played so far (mock audio is the UTF-8 text)
    #[must_use]
    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|clip| String::from_utf8_lossy(&clip.data).into_owned())
            .collect()
    }

    #[must_use]
    pub fn played_count(&self) -> usize {
        self.played.lock().unwrap().len()
    }

    #[must_use]
    pub fn media(&self) -> Vec<String> {
        self.media.lock().unwrap().clone()
    }

    #[must_use]
    pub fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }

    #[must_use]
    pub fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.lock().unwrap()
    }
}

#[async_trait]
impl VoiceLink for MockLink {
    fn name(&self) -> &str {
        "mock"
    }

    fn participants(&self) -> Vec<ParticipantId> {
        self.participants.clone()
    }

    async fn subscribe(&self, participant: &ParticipantId) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(64);
        self.streams.lock().unwrap().insert(participant.clone(), tx);
        Ok(rx)
    }

    async fn play(&self, clip: AudioClip, _volume: f32) -> Result<()> {
        self.played.lock().unwrap().push(clip);
        if !self.play_time.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(self.play_time) => {}
                () = self.stop.notified() => {}
            }
        }
        Ok(())
    }

    fn stop_playback(&self) {
        *self.stops.lock().unwrap() += 1;
        self.stop.notify_waiters();
    }

    async fn play_media(&self, locator: &str) -> Result<()> {
        self.media.lock().unwrap().push(locator.to_string());
        Ok(())
    }

    async fn post_text(&self, text: &str) -> Result<()> {
        self.posted.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        *self.disconnected.lock().unwrap() = true;
        self.streams.lock().unwrap().clear();
    }
}

/// Hands out a fresh [`MockLink`] per channel and keeps them for inspection
#[derive(Default)]
pub struct MockLinkFactory {
    links: Mutex<HashMap<String, Arc<MockLink>>>,
    /// Closed to keep `connect` pending
    pub gate: Gate,
}

impl MockLinkFactory {
    #[must_use]
    pub fn link(&self, channel: &str) -> Option<Arc<MockLink>> {
        self.links.lock().unwrap().get(channel).cloned()
    }
}

#[async_trait]
impl LinkFactory for MockLinkFactory {
    async fn connect(&self, channel: &str) -> Result<Arc<dyn VoiceLink>> {
        self.gate.pass().await;
        let link = Arc::new(MockLink::new(&["alice"]));
        self.links
            .lock()
            .unwrap()
            .insert(channel.to_string(), Arc::clone(&link));
        Ok(link)
    }
}

/// Returns scripted transcripts in order; an exhausted script yields errors
#[derive(Default)]
pub struct ScriptedTranscriber {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedTranscriber {
    pub fn push(&self, line: &str) {
        self.lines.lock().unwrap().push_back(line.to_string());
    }

    /// Transcripts not yet handed out
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lines.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _utterance: &Utterance) -> Result<String> {
        self.lines
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Transcription("no scripted transcript".to_string()))
    }
}

/// Returns scripted replies, defaulting to a short answer
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    /// Closed to keep replies in flight
    pub gate: Gate,
}

impl ScriptedGenerator {
    pub fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Generation("model offline".to_string())));
    }

    #[must_use]
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.gate.pass().await;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("Okay.".to_string()))
    }
}

/// "Synthesizes" text as its own UTF-8 bytes
#[derive(Default)]
pub struct EchoSynthesizer {
    fail_containing: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    /// Closed to keep synthesis in flight
    pub gate: Gate,
}

impl EchoSynthesizer {
    /// Fail every chunk containing `marker`
    pub fn fail_on(&self, marker: &str) {
        *self.fail_containing.lock().unwrap() = Some(marker.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push(text.to_string());
        self.gate.pass().await;
        let fails = self
            .fail_containing
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|marker| text.contains(marker));
        if fails {
            return Err(Error::Synthesis("voice unavailable".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Web search returning one fixed hit
pub struct FixedSearch;

#[async_trait]
impl WebSearch for FixedSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        Ok(vec![SearchHit {
            title: format!("About {query}"),
            url: "https://example.com".to_string(),
            snippet: "It is a popular topic.".to_string(),
        }])
    }
}

/// Media search resolving every query to a fixed locator
pub struct FixedMedia;

#[async_trait]
impl MediaSearch for FixedMedia {
    async fn find(&self, query: &str) -> Result<Option<String>> {
        Ok(Some(format!("https://media.example/{}", query.replace(' ', "-"))))
    }
}

/// Mock collaborators plus the services built from them
pub struct Harness {
    pub transcriber: Arc<ScriptedTranscriber>,
    pub generator: Arc<ScriptedGenerator>,
    pub synthesizer: Arc<EchoSynthesizer>,
    pub services: SessionServices,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    #[must_use]
    pub fn with_settings(settings: SessionSettings) -> Self {
        let transcriber = Arc::new(ScriptedTranscriber::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let synthesizer = Arc::new(EchoSynthesizer::default());

        let collaborators = Collaborators {
            transcriber: transcriber.clone(),
            generator: generator.clone(),
            synthesizer: synthesizer.clone(),
            converter: None,
            web_search: Some(Arc::new(FixedSearch)),
            media_search: Some(Arc::new(FixedMedia)),
        };

        let services = SessionServices {
            collaborators,
            settings,
            router: Arc::new(IntentRouter::new(&["bot".to_string()], PhraseBook::default())),
            alarms: AlarmRegistry::default(),
        };

        Self {
            transcriber,
            generator,
            synthesizer,
            services,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast settings for scenario tests
#[must_use]
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        capture: test_capture(),
        retry: RetryPolicy {
            backoff: Duration::from_millis(10),
            max_retries: 3,
        },
        system_prompt: "You are a test assistant.".to_string(),
        ..SessionSettings::default()
    }
}

/// Settings writing transcripts under `dir`
#[must_use]
pub fn settings_in(dir: &Path) -> SessionSettings {
    SessionSettings {
        transcript_dir: dir.to_path_buf(),
        ..test_settings()
    }
}

/// Earcons with a clip for the alarm sound only
#[must_use]
pub fn alarm_earcons() -> Arc<Earcons> {
    let mut earcons = Earcons::default();
    earcons.insert(
        huddle::playback::Earcon::Alarm,
        AudioClip::new("alarm", b"ring".to_vec()),
    );
    Arc::new(earcons)
}
