//! Bounded per-participant conversation memory

use std::collections::HashMap;

use super::{ChatMessage, Role};
use crate::voice::ParticipantId;

/// Conversation history keyed by participant
///
/// Each participant's log starts with the system prompt and never grows
/// beyond `max_messages`; the oldest non-system messages are dropped first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    system_prompt: String,
    max_messages: usize,
    logs: HashMap<ParticipantId, Vec<ChatMessage>>,
}

impl ChatHistory {
    /// Create an empty history
    ///
    /// `max_messages` is clamped to at least 1.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_messages: max_messages.max(1),
            logs: HashMap::new(),
        }
    }

    /// Messages to send for a new user turn, without recording it yet
    ///
    /// The turn is only committed with [`Self::record_exchange`] once the
    /// generator has answered, so declined or failed turns leave no trace.
    #[must_use]
    pub fn preview_with(&self, participant: &ParticipantId, user_text: &str) -> Vec<ChatMessage> {
        let mut messages = self
            .logs
            .get(participant)
            .cloned()
            .unwrap_or_else(|| self.seed());
        messages.push(ChatMessage::user(user_text));
        self.trim(&mut messages);
        messages
    }

    /// Commit a completed user/assistant exchange
    pub fn record_exchange(&mut self, participant: &ParticipantId, user_text: &str, reply: &str) {
        let seed = self.seed();
        let log = self.logs.entry(participant.clone()).or_insert(seed);
        log.push(ChatMessage::user(user_text));
        log.push(ChatMessage::assistant(reply));

        let max = self.max_messages;
        trim_to(log, max);
    }

    /// A participant's current log
    #[must_use]
    pub fn messages(&self, participant: &ParticipantId) -> &[ChatMessage] {
        self.logs.get(participant).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Forget every participant's conversation
    pub fn clear(&mut self) {
        self.logs.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Number of participants with a log
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    #[must_use]
    pub const fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn seed(&self) -> Vec<ChatMessage> {
        if self.system_prompt.is_empty() {
            Vec::new()
        } else {
            vec![ChatMessage::system(self.system_prompt.clone())]
        }
    }

    fn trim(&self, messages: &mut Vec<ChatMessage>) {
        trim_to(messages, self.max_messages);
    }
}

/// Drop the oldest messages until `log.len() <= max`, keeping a leading
/// system prompt pinned whenever there is room for something after it
fn trim_to(log: &mut Vec<ChatMessage>, max: usize) {
    if log.len() <= max {
        return;
    }
    let pinned = usize::from(max > 1 && log.first().is_some_and(|m| m.role == Role::System));
    let excess = log.len() - max;
    log.drain(pinned..pinned + excess);
}
