//! Voice conversion (RVC-style voice-to-voice services)

use async_trait::async_trait;

use crate::{Error, Result};

/// Re-voices synthesized audio
#[async_trait]
pub trait VoiceConverter: Send + Sync {
    /// Convert `audio` using the voice parameters encoded in `query`
    async fn convert(&self, audio: Vec<u8>, query: &str) -> Result<Vec<u8>>;

    /// Query string this converter was configured with
    fn default_query(&self) -> &str;
}

/// Voice parameters sent to the conversion service
#[derive(Debug, Clone)]
pub struct VoiceParams {
    /// Voice model name on the conversion server
    pub model: String,
    /// Pitch shift in semitones
    pub pitch: i32,
    /// Pitch extraction method (e.g. `rmvpe`)
    pub method: String,
}

impl VoiceParams {
    /// Encode as a URL query string
    #[must_use]
    pub fn to_query(&self) -> String {
        format!(
            "model_name={}&f0up_key={}&f0method={}",
            urlencoding::encode(&self.model),
            self.pitch,
            urlencoding::encode(&self.method),
        )
    }
}

/// HTTP client for a voice-to-voice conversion server
pub struct VoiceConversionClient {
    client: reqwest::Client,
    endpoint: String,
    query: String,
}

impl VoiceConversionClient {
    #[must_use]
    pub fn new(endpoint: String, params: &VoiceParams) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            query: params.to_query(),
        }
    }
}

#[async_trait]
impl VoiceConverter for VoiceConversionClient {
    async fn convert(&self, audio: Vec<u8>, query: &str) -> Result<Vec<u8>> {
        tracing::debug!(audio_bytes = audio.len(), "converting voice");

        let form = reqwest::multipart::Form::new().part(
            "input_file",
            reqwest::multipart::Part::bytes(audio)
                .file_name("speech.mp3")
                .mime_str("audio/mpeg")
                .map_err(|e| Error::Conversion(e.to_string()))?,
        );

        let response = self
            .client
            .post(format!("{}/voice2voice?{query}", self.endpoint))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Conversion(format!("conversion error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn default_query(&self) -> &str {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_url_encoded() {
        let params = VoiceParams {
            model: "my voice.pth".to_string(),
            pitch: -2,
            method: "rmvpe".to_string(),
        };
        assert_eq!(
            params.to_query(),
            "model_name=my%20voice.pth&f0up_key=-2&f0method=rmvpe"
        );
    }
}
