//! Daemon - the huddle service
//!
//! Builds collaborators from configuration, joins the local voice session,
//! and serves text commands from Discord until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agent::{BraveSearch, ChatClient, LlmProvider, MediaSearch, WebSearch, YouTubeSearch};
use crate::alarm::AlarmRegistry;
use crate::channels::{
    Channel, DiscordChannel, IncomingMessage, OutgoingMessage, TextCommand,
};
use crate::config::{Config, share_key};
use crate::intent::IntentRouter;
use crate::orchestrator::Orchestrator;
use crate::playback::{Earcons, RetryPolicy};
use crate::session::{
    CapturePolicy, Collaborators, SessionMode, SessionServices, SessionSettings,
};
use crate::voice::{
    LocalLinkFactory, SpeechToText, SttProvider, Synthesizer, TextToSpeech, Transcriber,
    TtsProvider, VoiceConversionClient, VoiceConverter, VoiceParams,
};
use crate::Result;

/// Channel name of the session on this machine's microphone and speakers
pub const LOCAL_CHANNEL: &str = "local";

/// Build the HTTP collaborators described by `config`
///
/// Search clients are only created when their API keys are present.
///
/// # Errors
///
/// Returns error if a selected provider is missing its API key
pub fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let keys = &config.api_keys;

    let transcriber: Arc<dyn Transcriber> = match config.stt.provider {
        SttProvider::Whisper => Arc::new(SpeechToText::new_whisper(
            config.stt.endpoint.clone(),
            share_key(keys.openai.as_ref()),
            config.stt.model.clone(),
        )),
        SttProvider::Deepgram => Arc::new(SpeechToText::new_deepgram(
            config.stt.endpoint.clone(),
            share_key(keys.deepgram.as_ref()),
            config.stt.model.clone(),
        )?),
    };

    let llm_key = match config.llm.provider {
        LlmProvider::OpenAI => share_key(keys.openai.as_ref()),
        LlmProvider::Ollama => None,
    };
    let generator = Arc::new(ChatClient::new(
        config.llm.provider,
        config.llm.endpoint.clone(),
        llm_key,
        config.llm.model.clone(),
    ));

    let synthesizer: Arc<dyn Synthesizer> = match config.tts.provider {
        TtsProvider::OpenAI => Arc::new(TextToSpeech::new_openai(
            config.tts.endpoint.clone(),
            share_key(keys.openai.as_ref()),
            config.tts.model.clone(),
            config.tts.voice.clone(),
            config.tts.speed,
        )),
        TtsProvider::ElevenLabs => Arc::new(TextToSpeech::new_elevenlabs(
            config.tts.endpoint.clone(),
            share_key(keys.elevenlabs.as_ref()),
            config.tts.model.clone(),
            config.tts.voice.clone(),
        )?),
    };

    let converter = config.rvc.as_ref().map(|rvc| {
        tracing::info!(endpoint = %rvc.endpoint, model = %rvc.model, "voice conversion enabled");
        let params = VoiceParams {
            model: rvc.model.clone(),
            pitch: rvc.pitch,
            method: rvc.method.clone(),
        };
        Arc::new(VoiceConversionClient::new(rvc.endpoint.clone(), &params))
            as Arc<dyn VoiceConverter>
    });

    let web_search = share_key(keys.brave.as_ref())
        .map(|key| Arc::new(BraveSearch::new(key)) as Arc<dyn WebSearch>);
    let media_search = share_key(keys.youtube.as_ref())
        .map(|key| Arc::new(YouTubeSearch::new(key)) as Arc<dyn MediaSearch>);

    if web_search.is_none() {
        tracing::debug!("no search key, spoken searches will apologize");
    }
    if media_search.is_none() {
        tracing::debug!("no media key, media requests will apologize");
    }

    Ok(Collaborators {
        transcriber,
        generator,
        synthesizer,
        converter,
        web_search,
        media_search,
    })
}

/// Session tunables from `config`, with earcons loaded from the sounds directory
#[must_use]
pub fn session_settings(config: &Config) -> SessionSettings {
    let earcons = Earcons::load(&config.sounds_dir, &config.alarms.sound);

    SessionSettings {
        capture: CapturePolicy {
            silence: Duration::from_millis(config.audio.silence_ms),
            energy_threshold: config.audio.energy_threshold,
            sample_rate: config.audio.sample_rate,
            max_utterance: Duration::from_secs(config.audio.max_utterance_secs),
        },
        chunk_words: config.playback.chunk_words,
        retry: RetryPolicy {
            backoff: Duration::from_millis(config.playback.backoff_ms),
            max_retries: config.playback.max_retries,
        },
        memory_size: config.memory_size,
        system_prompt: config.system_prompt.clone(),
        speech_volume: config.playback.volume,
        alarm_volume: config.alarms.volume,
        alarm_repeats: config.alarms.repeats,
        earcons: Arc::new(earcons),
        transcript_dir: config.transcript_dir.clone(),
    }
}

/// Intent router with the configured triggers and phrase-set overrides
#[must_use]
pub fn intent_router(config: &Config) -> IntentRouter {
    IntentRouter::with_overrides(&config.triggers, &config.intents)
}

/// The huddle daemon
pub struct Daemon {
    config: Config,
    mode: SessionMode,
    join_local: bool,
}

impl Daemon {
    /// Create a daemon that joins the local session in `mode`
    #[must_use]
    pub const fn new(config: Config, mode: SessionMode) -> Self {
        Self {
            config,
            mode,
            join_local: true,
        }
    }

    /// Serve text commands only, without opening the local microphone
    #[must_use]
    pub const fn without_local_session(mut self) -> Self {
        self.join_local = false;
        self
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if collaborators cannot be built or the local session
    /// cannot be joined
    pub async fn run(self) -> Result<()> {
        let services = SessionServices {
            collaborators: build_collaborators(&self.config)?,
            settings: session_settings(&self.config),
            router: Arc::new(intent_router(&self.config)),
            alarms: AlarmRegistry::default(),
        };

        let factory = Arc::new(LocalLinkFactory::new(self.config.audio.sample_rate));
        let orchestrator = Arc::new(Orchestrator::new(factory, services));

        tracing::info!(
            triggers = ?self.config.triggers,
            mode = %self.mode,
            "daemon running"
        );

        if self.join_local {
            orchestrator.join(LOCAL_CHANNEL, self.mode).await?;
        }

        if let Some(token) = share_key(self.config.api_keys.discord.as_ref()) {
            let (mut discord, rx) = DiscordChannel::with_receiver(token);

            if let Err(e) = discord.connect().await {
                tracing::error!(error = %e, "Discord connect failed");
            } else {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    handle_channel_messages(rx, discord, orchestrator).await;
                });
            }
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for ctrl-c");
        }
        tracing::info!("shutdown requested");

        orchestrator.shutdown().await;
        Ok(())
    }
}

/// Run text commands from a channel against the orchestrator
///
/// Returns once the channel's receiver closes.
pub async fn handle_channel_messages<C: Channel>(
    mut rx: mpsc::Receiver<IncomingMessage>,
    channel: C,
    orchestrator: Arc<Orchestrator>,
) {
    while let Some(msg) = rx.recv().await {
        let reply = match TextCommand::parse(&msg.content) {
            None => continue,
            Some(Err(e)) => format!("Sorry, {e}."),
            Some(Ok(command)) => {
                let _ = channel.send_typing(&msg.channel_id).await;
                orchestrator.handle_text(msg.session_key(), command).await
            }
        };

        tracing::debug!(
            channel = channel.name(),
            sender = %msg.sender_name,
            "replying to text command"
        );

        let outgoing = OutgoingMessage::reply(msg.channel_id.clone(), reply, msg.id.clone());
        if let Err(e) = channel.send(outgoing).await {
            tracing::error!(channel = channel.name(), error = %e, "failed to send reply");
        }
    }

    tracing::info!(channel = channel.name(), "channel closed");
}
