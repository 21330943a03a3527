//! TOML configuration file loading
//!
//! Supports `~/.config/huddle/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HuddleConfigFile {
    /// Names the assistant answers to
    pub triggers: Option<Vec<String>>,

    /// Prompt pinned at the head of every conversation
    pub system_prompt: Option<String>,

    /// Chat history bound per participant
    pub memory_size: Option<usize>,

    /// Directory holding earcon and alarm sounds
    pub sounds_dir: Option<String>,

    /// Directory for transcribing-mode logs
    pub transcript_dir: Option<String>,

    #[serde(default)]
    pub audio: AudioFileConfig,

    #[serde(default)]
    pub stt: ServiceFileConfig,

    #[serde(default)]
    pub llm: ServiceFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub rvc: RvcFileConfig,

    #[serde(default)]
    pub playback: PlaybackFileConfig,

    #[serde(default)]
    pub alarms: AlarmFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Command phrase-set overrides, keyed by command
    #[serde(default)]
    pub intents: HashMap<String, Vec<String>>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    pub silence_ms: Option<u64>,
    pub energy_threshold: Option<f32>,
    pub max_utterance_secs: Option<u64>,
}

/// Endpoint/model/provider triple shared by STT and LLM
#[derive(Debug, Default, Deserialize)]
pub struct ServiceFileConfig {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

/// Voice conversion configuration
#[derive(Debug, Default, Deserialize)]
pub struct RvcFileConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub pitch: Option<i32>,
    pub method: Option<String>,
}

/// Playback queue configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    pub chunk_words: Option<usize>,
    pub backoff_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub volume: Option<f32>,
}

/// Alarm configuration
#[derive(Debug, Default, Deserialize)]
pub struct AlarmFileConfig {
    pub sound: Option<String>,
    pub volume: Option<f32>,
    pub repeats: Option<u32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
    pub brave: Option<String>,
    pub youtube: Option<String>,
    pub discord: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HuddleConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HuddleConfigFile {
    config_file_path().map_or_else(HuddleConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> HuddleConfigFile {
    if !path.exists() {
        return HuddleConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HuddleConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HuddleConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/huddle/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("huddle").join("config.toml"))
}
