//! Platform voice connection seam
//!
//! A [`VoiceLink`] is whatever carries audio between the assistant and the
//! people in a voice channel. The core never talks to a platform directly.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::audio::pcm_to_wav;
use crate::Result;

/// Identity of a speaking participant (platform user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap a platform user id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw platform id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One packet of mono 16-bit PCM received from a participant
#[derive(Debug, Clone, Default)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
}

impl AudioFrame {
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }
}

/// A finished, silence-terminated utterance ready for transcription
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Who spoke
    pub participant: ParticipantId,
    /// When the first voiced frame arrived
    pub started_at: DateTime<Utc>,
    /// Sample rate of `samples`
    pub sample_rate: u32,
    /// Mono 16-bit PCM
    pub samples: Vec<i16>,
}

impl Utterance {
    /// Spoken length of the utterance
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.samples.len() as u64 * 1000 / u64::from(self.sample_rate))
    }

    /// Encode as a WAV file for speech-to-text APIs
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        pcm_to_wav(&self.samples, self.sample_rate)
    }
}

/// Encoded audio (mp3) that can be handed to a link for playback
///
/// The clip owns its bytes; dropping it releases the backing resource.
#[derive(Clone)]
pub struct AudioClip {
    /// Human-readable label for logs (e.g. `chunk 3`, `earcon understood`)
    pub label: String,
    /// Encoded audio bytes
    pub data: Vec<u8>,
}

impl AudioClip {
    #[must_use]
    pub fn new(label: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("label", &self.label)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A joined voice channel
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Human-readable channel name for logs
    fn name(&self) -> &str;

    /// Participants currently in the channel (bots excluded)
    fn participants(&self) -> Vec<ParticipantId>;

    /// Subscribe to a participant's audio
    ///
    /// Frames stop arriving while the participant is silent. The receiver
    /// closes when the participant leaves or the link is disconnected.
    async fn subscribe(&self, participant: &ParticipantId) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Play a clip, resolving once playback has finished or was stopped
    async fn play(&self, clip: AudioClip, volume: f32) -> Result<()>;

    /// Interrupt whatever is currently playing
    fn stop_playback(&self);

    /// Start streaming a media locator (e.g. a video URL) into the channel
    async fn play_media(&self, locator: &str) -> Result<()>;

    /// Post a text message to the text channel paired with this voice channel
    async fn post_text(&self, text: &str) -> Result<()>;

    /// Leave the voice channel
    async fn disconnect(&self);
}

/// Opens voice links when a join command arrives
#[async_trait]
pub trait LinkFactory: Send + Sync {
    /// Join the named voice channel
    async fn connect(&self, channel: &str) -> Result<std::sync::Arc<dyn VoiceLink>>;
}
