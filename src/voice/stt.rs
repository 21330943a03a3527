//! Speech-to-text (STT) gateway

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::link::Utterance;
use crate::{Error, Result};

/// Converts a finished utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance
    async fn transcribe(&self, utterance: &Utterance) -> Result<String>;
}

/// Response from a Whisper-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    /// `OpenAI` Whisper or any server exposing `/v1/audio/transcriptions`
    Whisper,
    /// Deepgram pre-recorded API
    Deepgram,
}

impl SttProvider {
    /// Parse a provider name, defaulting to Whisper
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("deepgram") {
            Self::Deepgram
        } else {
            Self::Whisper
        }
    }
}

/// HTTP speech-to-text client
pub struct SpeechToText {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a Whisper-compatible client
    ///
    /// Self-hosted servers usually need no key, so `api_key` is optional.
    #[must_use]
    pub fn new_whisper(endpoint: String, api_key: Option<SecretString>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            provider: SttProvider::Whisper,
        }
    }

    /// Create a Deepgram client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new_deepgram(endpoint: String, api_key: Option<SecretString>, model: String) -> Result<Self> {
        if api_key.is_none() {
            return Err(Error::ConfigurationMissing("Deepgram API key"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            provider: SttProvider::Deepgram,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> SttProvider {
        self.provider
    }

    /// Transcribe using a Whisper-compatible endpoint
    async fn transcribe_whisper(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let mut request = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.endpoint))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Whisper request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Transcription(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!("{}/v1/listen?model={}&punctuate=true", self.endpoint, self.model);
        let key = self
            .api_key
            .as_ref()
            .ok_or(Error::ConfigurationMissing("Deepgram API key"))?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Transcription(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, utterance: &Utterance) -> Result<String> {
        let wav = utterance.to_wav()?;
        let text = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await?,
        };

        tracing::info!(participant = %utterance.participant, transcript = %text, "transcription complete");
        Ok(text)
    }
}
