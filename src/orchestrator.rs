//! Table of live voice sessions
//!
//! The orchestrator is the only owner of [`VoiceSession`]s. Sessions are
//! created by a join, destroyed by a leave (typed or spoken), and are
//! otherwise fully independent of each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channels::TextCommand;
use crate::session::{SessionMode, SessionServices, VoiceSession};
use crate::voice::LinkFactory;
use crate::{Error, Result};

const BUSY: &str = "I'm busy right now.";

/// Creates, tracks and tears down voice sessions
pub struct Orchestrator {
    factory: Arc<dyn LinkFactory>,
    services: SessionServices,
    sessions: Mutex<HashMap<String, VoiceSession>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(factory: Arc<dyn LinkFactory>, services: SessionServices) -> Self {
        Self {
            factory,
            services,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn services(&self) -> &SessionServices {
        &self.services
    }

    /// Join `channel` in `mode`
    ///
    /// # Errors
    ///
    /// Returns error if a live session already exists for `channel` or the
    /// link cannot be established
    pub async fn join(&self, channel: &str, mode: SessionMode) -> Result<VoiceSession> {
        let already = || Error::Channel(format!("already in a voice session for {channel}"));

        if self.session(channel).await.is_some() {
            return Err(already());
        }

        // Link setup can be slow; the table stays unlocked meanwhile
        let link = self.factory.connect(channel).await?;
        let session = VoiceSession::start(channel, mode, link, self.services.clone()).await;

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.is_alive());
        if sessions.contains_key(channel) {
            drop(sessions);
            tracing::info!(channel, "lost a concurrent join, leaving again");
            if let Err(e) = session.leave().await {
                tracing::debug!(channel, error = %e, "duplicate session already gone");
            }
            return Err(already());
        }
        sessions.insert(channel.to_string(), session.clone());
        drop(sessions);

        tracing::info!(channel, mode = %mode, "joined voice channel");
        Ok(session)
    }

    /// Live session for `channel`, if any
    pub async fn session(&self, channel: &str) -> Option<VoiceSession> {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.is_alive());
        sessions.get(channel).cloned()
    }

    async fn require(&self, channel: &str) -> Result<VoiceSession> {
        self.session(channel)
            .await
            .ok_or_else(|| Error::Channel(format!("not in a voice session for {channel}")))
    }

    /// Leave `channel`; returns the transcript for transcribing sessions
    ///
    /// # Errors
    ///
    /// Returns error if there is no live session for `channel`
    pub async fn leave(&self, channel: &str) -> Result<Option<String>> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(channel)
            .ok_or_else(|| Error::Channel(format!("not in a voice session for {channel}")))?;

        let transcript = session.leave().await?;
        tracing::info!(channel, "left voice channel");
        Ok(transcript)
    }

    /// Clear the chat history of the session for `channel`
    ///
    /// # Errors
    ///
    /// Returns error if there is no live session for `channel`
    pub async fn reset(&self, channel: &str) -> Result<()> {
        self.require(channel).await?.reset_history()
    }

    /// Names of live sessions
    pub async fn channels(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.is_alive());
        let mut names: Vec<String> = sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Leave every session
    pub async fn shutdown(&self) {
        let sessions: Vec<(String, VoiceSession)> =
            self.sessions.lock().await.drain().collect();
        let leaving = sessions.iter().map(|(channel, session)| async move {
            if let Err(e) = session.leave().await {
                tracing::debug!(channel = %channel, error = %e, "session already gone");
            }
        });
        futures::future::join_all(leaving).await;
    }

    /// Run a text command for `channel` and produce the reply to post
    pub async fn handle_text(&self, channel: &str, command: TextCommand) -> String {
        tracing::debug!(channel, command = %command, "text command");

        let result = match &command {
            TextCommand::Join(mode) => self
                .join(channel, *mode)
                .await
                .map(|_| format!("Joined voice chat in {mode} mode.")),
            TextCommand::Leave => self.leave(channel).await.map(|transcript| match transcript {
                Some(text) => format!("Left voice chat. Transcript:\n{text}"),
                None => "Left voice chat.".to_string(),
            }),
            TextCommand::Reset => self
                .reset(channel)
                .await
                .map(|()| "Chat history cleared.".to_string()),
            TextCommand::Play(query) => match self.require(channel).await {
                Ok(session) => session
                    .play_media(query.clone())
                    .await
                    .map(|accepted| accepted_reply(accepted, || format!("Looking up {query}."))),
                Err(e) => Err(e),
            },
            TextCommand::Search(query) => match self.require(channel).await {
                Ok(session) => session
                    .search(query.clone())
                    .await
                    .map(|accepted| accepted_reply(accepted, || format!("Searching for {query}."))),
                Err(e) => Err(e),
            },
        };

        result.unwrap_or_else(|e| {
            tracing::info!(channel, command = %command, error = %e, "text command failed");
            format!("Sorry, {e}.")
        })
    }
}

fn accepted_reply(accepted: bool, reply: impl FnOnce() -> String) -> String {
    if accepted { reply() } else { BUSY.to_string() }
}
