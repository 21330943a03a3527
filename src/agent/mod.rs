//! Response generation
//!
//! The assistant's "brain" is an external chat-completion service. This
//! module holds the seam for it, the per-participant conversation memory,
//! and the search helpers used by spoken search and media commands.

mod chat;
mod history;
mod search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chat::{ChatClient, LlmProvider};
pub use history::ChatHistory;
pub use search::{BraveSearch, MediaSearch, SearchHit, WebSearch, YouTubeSearch, search_prompt};

use crate::Result;

/// Substring a generator returns to decline answering
///
/// A reply containing it is neither spoken nor remembered.
pub const DECLINE_SENTINEL: &str = "IGNORING";

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Produces assistant text from an ordered conversation
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generate the next assistant message
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Whether a generated reply asks to be ignored
#[must_use]
pub fn is_declined(reply: &str) -> bool {
    reply.contains(DECLINE_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_detection() {
        assert!(is_declined("IGNORING"));
        assert!(is_declined("I'm IGNORING this one."));
        assert!(!is_declined("ignoring lowercase is a normal word"));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
