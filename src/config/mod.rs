//! Configuration management for huddle
//!
//! Every setting is resolved per field: environment variable, then the TOML
//! file, then the built-in default.

pub mod file;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::agent::LlmProvider;
use crate::voice::{SttProvider, TtsProvider};

pub use file::{HuddleConfigFile, config_file_path, load_config_file};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant taking part in a voice chat. \
Answer in a few short spoken sentences without markdown, lists or URLs. \
If a message was clearly not meant for you, reply with only the word IGNORING.";

/// huddle configuration
#[derive(Debug)]
pub struct Config {
    /// Names the assistant answers to
    pub triggers: Vec<String>,

    /// Prompt pinned at the head of every conversation
    pub system_prompt: String,

    /// Chat history bound per participant
    pub memory_size: usize,

    /// Capture configuration
    pub audio: AudioConfig,

    /// Speech-to-text service
    pub stt: SttConfig,

    /// Chat completion service
    pub llm: LlmConfig,

    /// Speech synthesis service
    pub tts: TtsConfig,

    /// Voice conversion service, disabled when absent
    pub rvc: Option<RvcConfig>,

    /// Playback queue configuration
    pub playback: PlaybackConfig,

    /// Alarm sound configuration
    pub alarms: AlarmConfig,

    /// Directory holding earcon and alarm sounds
    pub sounds_dir: PathBuf,

    /// Directory for transcribing-mode logs
    pub transcript_dir: PathBuf,

    /// API keys
    pub api_keys: ApiKeys,

    /// Command phrase-set overrides, keyed by command
    pub intents: HashMap<String, Vec<String>>,
}

/// Capture configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Silence that ends an utterance
    pub silence_ms: u64,
    pub energy_threshold: f32,
    pub max_utterance_secs: u64,
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: SttProvider,
    pub endpoint: String,
    pub model: String,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub endpoint: String,
    pub model: String,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub endpoint: String,
    pub model: String,
    /// Voice name, or voice id for `ElevenLabs`
    pub voice: String,
    /// Speed multiplier (0.25 to 4.0)
    pub speed: f32,
}

/// Voice conversion configuration
#[derive(Debug, Clone)]
pub struct RvcConfig {
    pub endpoint: String,
    pub model: String,
    /// Semitone shift
    pub pitch: i32,
    /// Pitch extraction method
    pub method: String,
}

/// Playback queue configuration
#[derive(Debug, Clone, Copy)]
pub struct PlaybackConfig {
    /// Maximum words per synthesized chunk
    pub chunk_words: usize,
    /// Wait between checks for a late chunk
    pub backoff_ms: u64,
    /// Checks allowed per chunk before the response is abandoned
    pub max_retries: u32,
    pub volume: f32,
}

/// Alarm configuration
#[derive(Debug, Clone)]
pub struct AlarmConfig {
    /// Sound file name in the sounds directory
    pub sound: String,
    pub volume: f32,
    pub repeats: u32,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub elevenlabs: Option<SecretString>,
    pub deepgram: Option<SecretString>,
    /// Brave Search, for spoken web searches
    pub brave: Option<SecretString>,
    /// `YouTube` Data API, for media lookups
    pub youtube: Option<SecretString>,
    pub discord: Option<SecretString>,
}

/// Copy a key for a second client
#[must_use]
pub fn share_key(key: Option<&SecretString>) -> Option<SecretString> {
    key.map(|k| SecretString::from(k.expose_secret().to_string()))
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, fallback: T) -> T {
    match value.map(|v| v.parse::<T>()) {
        Some(Ok(parsed)) => parsed,
        Some(Err(_)) => {
            tracing::warn!(var = name, "invalid value, using default");
            fallback
        }
        None => fallback,
    }
}

impl Config {
    /// Load configuration from the environment and the standard TOML file
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(load_config_file(), |name| std::env::var(name).ok())
    }

    /// Merge `env` over a parsed config file
    ///
    /// `env` returns the value of an environment variable, if set.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn from_sources(fc: HuddleConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let secret = |name: &str, file: Option<String>| var(name).or(file).map(SecretString::from);

        let triggers = var("HUDDLE_TRIGGERS")
            .map(|v| {
                v.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .or(fc.triggers)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| vec!["bot".to_string()]);

        let system_prompt = var("HUDDLE_SYSTEM_PROMPT")
            .or(fc.system_prompt)
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let memory_size = parse_or(
            "HUDDLE_MEMORY_SIZE",
            var("HUDDLE_MEMORY_SIZE"),
            fc.memory_size.unwrap_or(20),
        );

        let audio = AudioConfig {
            sample_rate: parse_or(
                "HUDDLE_SAMPLE_RATE",
                var("HUDDLE_SAMPLE_RATE"),
                fc.audio.sample_rate.unwrap_or(48_000),
            ),
            silence_ms: parse_or(
                "HUDDLE_SILENCE_MS",
                var("HUDDLE_SILENCE_MS"),
                fc.audio.silence_ms.unwrap_or(2000),
            ),
            energy_threshold: fc.audio.energy_threshold.unwrap_or(0.01),
            max_utterance_secs: fc.audio.max_utterance_secs.unwrap_or(30),
        };

        let stt = SttConfig {
            provider: SttProvider::from_name(
                &var("HUDDLE_STT_PROVIDER")
                    .or(fc.stt.provider)
                    .unwrap_or_default(),
            ),
            endpoint: var("HUDDLE_STT_ENDPOINT")
                .or(fc.stt.endpoint)
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: var("HUDDLE_STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| "whisper-1".to_string()),
        };

        let llm = LlmConfig {
            provider: LlmProvider::from_name(
                &var("HUDDLE_LLM_PROVIDER")
                    .or(fc.llm.provider)
                    .unwrap_or_default(),
            ),
            endpoint: var("HUDDLE_LLM_ENDPOINT")
                .or(fc.llm.endpoint)
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: var("HUDDLE_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "llama3.2".to_string()),
        };

        let tts = TtsConfig {
            provider: TtsProvider::from_name(
                &var("HUDDLE_TTS_PROVIDER")
                    .or(fc.tts.provider)
                    .unwrap_or_default(),
            ),
            endpoint: var("HUDDLE_TTS_ENDPOINT")
                .or(fc.tts.endpoint)
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: var("HUDDLE_TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or_else(|| "tts-1".to_string()),
            voice: var("HUDDLE_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| "alloy".to_string()),
            speed: fc.tts.speed.unwrap_or(1.0).clamp(0.25, 4.0),
        };

        let rvc = var("HUDDLE_RVC_ENDPOINT")
            .or(fc.rvc.endpoint)
            .map(|endpoint| RvcConfig {
                endpoint,
                model: var("HUDDLE_RVC_MODEL")
                    .or(fc.rvc.model)
                    .unwrap_or_default(),
                pitch: fc.rvc.pitch.unwrap_or(0),
                method: fc.rvc.method.unwrap_or_else(|| "rmvpe".to_string()),
            });

        let playback = PlaybackConfig {
            chunk_words: parse_or(
                "HUDDLE_CHUNK_WORDS",
                var("HUDDLE_CHUNK_WORDS"),
                fc.playback.chunk_words.unwrap_or(60),
            )
            .max(1),
            backoff_ms: fc.playback.backoff_ms.unwrap_or(1000),
            max_retries: fc.playback.max_retries.unwrap_or(10),
            volume: fc.playback.volume.unwrap_or(1.0),
        };

        let alarms = AlarmConfig {
            sound: fc.alarms.sound.unwrap_or_else(|| "alarm".to_string()),
            volume: fc.alarms.volume.unwrap_or(0.8),
            repeats: fc.alarms.repeats.unwrap_or(5),
        };

        let sounds_dir = var("HUDDLE_SOUNDS_DIR")
            .or(fc.sounds_dir)
            .map_or_else(|| PathBuf::from("sounds"), PathBuf::from);
        let transcript_dir = var("HUDDLE_TRANSCRIPT_DIR")
            .or(fc.transcript_dir)
            .map_or_else(|| PathBuf::from("transcripts"), PathBuf::from);

        let keys = fc.api_keys;
        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY", keys.openai),
            elevenlabs: secret("ELEVENLABS_API_KEY", keys.elevenlabs),
            deepgram: secret("DEEPGRAM_API_KEY", keys.deepgram),
            brave: secret("BRAVE_API_KEY", keys.brave),
            youtube: secret("YOUTUBE_API_KEY", keys.youtube),
            discord: secret("DISCORD_TOKEN", keys.discord),
        };

        Self {
            triggers,
            system_prompt,
            memory_size,
            audio,
            stt,
            llm,
            tts,
            rvc,
            playback,
            alarms,
            sounds_dir,
            transcript_dir,
            api_keys,
            intents: fc.intents,
        }
    }
}
