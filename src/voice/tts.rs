//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Turns a text chunk into encoded (mp3) audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one chunk of text
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    /// `OpenAI` or any server exposing `/v1/audio/speech`
    OpenAI,
    /// `ElevenLabs`
    ElevenLabs,
}

impl TtsProvider {
    /// Parse a provider name, defaulting to `OpenAI`-compatible
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("elevenlabs") {
            Self::ElevenLabs
        } else {
            Self::OpenAI
        }
    }
}

/// HTTP text-to-speech client
pub struct TextToSpeech {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create an `OpenAI`-compatible client
    #[must_use]
    pub fn new_openai(
        endpoint: String,
        api_key: Option<SecretString>,
        model: String,
        voice: String,
        speed: f32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAI,
        }
    }

    /// Create an `ElevenLabs` client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_elevenlabs(
        endpoint: String,
        api_key: Option<SecretString>,
        model: String,
        voice_id: String,
    ) -> Result<Self> {
        if api_key.is_none() {
            return Err(Error::ConfigurationMissing("ElevenLabs API key"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> TtsProvider {
        self.provider
    }

    /// Synthesize using an `OpenAI`-compatible endpoint
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
            speed: self.speed,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/audio/speech", self.endpoint))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Synthesize using `ElevenLabs`
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let key = self
            .api_key
            .as_ref()
            .ok_or(Error::ConfigurationMissing("ElevenLabs API key"))?;

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.endpoint, self.voice))
            .header("xi-api-key", key.expose_secret())
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("ElevenLabs TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), provider = ?self.provider, "synthesizing");
        match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }
}
