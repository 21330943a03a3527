//! HTTP chat-completion client

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ResponseGenerator};
use crate::{Error, Result};

/// Chat API dialect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama `/api/chat`
    Ollama,
    /// `OpenAI`-compatible `/v1/chat/completions`
    OpenAI,
}

impl LlmProvider {
    /// Parse a provider name, defaulting to Ollama
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("openai") {
            Self::OpenAI
        } else {
            Self::Ollama
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat-completion client for local or hosted models
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    provider: LlmProvider,
}

impl ChatClient {
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        endpoint: String,
        api_key: Option<SecretString>,
        model: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            provider,
        }
    }

    fn url(&self) -> String {
        match self.provider {
            LlmProvider::Ollama => format!("{}/api/chat", self.endpoint),
            LlmProvider::OpenAI => format!("{}/v1/chat/completions", self.endpoint),
        }
    }
}

#[async_trait]
impl ResponseGenerator for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            provider = ?self.provider,
            "requesting completion"
        );

        let mut request = self.client.post(self.url()).json(&ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "chat request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("chat API error {status}: {body}")));
        }

        let content = match self.provider {
            LlmProvider::Ollama => response.json::<OllamaResponse>().await?.message.content,
            LlmProvider::OpenAI => response
                .json::<OpenAiResponse>()
                .await?
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| Error::Generation("no choices in response".to_string()))?,
        };

        tracing::info!(chars = content.len(), "completion received");
        Ok(content)
    }
}
