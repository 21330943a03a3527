//! Text channel adapters
//!
//! Voice sessions are started and managed with short text commands typed in
//! a chat channel (`>join`, `>leave`, ...). Each adapter implements
//! [`Channel`] and forwards incoming messages as [`IncomingMessage`]s.

mod discord;

use std::fmt;

use async_trait::async_trait;

pub use discord::DiscordChannel;

use crate::session::SessionMode;
use crate::{Error, Result};

/// Prefix that marks a text command
pub const COMMAND_PREFIX: char = '>';

/// A message from a channel
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Message identifier (platform-specific)
    pub id: String,

    /// Text channel the message was posted in
    pub channel_id: String,

    /// Server the channel belongs to, if any
    pub guild_id: Option<String>,

    /// Sender display name
    pub sender_name: String,

    /// Message content
    pub content: String,
}

impl IncomingMessage {
    /// Key of the voice session this message controls
    ///
    /// One voice session per server; direct messages use their channel.
    #[must_use]
    pub fn session_key(&self) -> &str {
        self.guild_id.as_deref().unwrap_or(&self.channel_id)
    }
}

/// A message to send to a channel
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Channel identifier
    pub channel_id: String,

    /// Message content
    pub content: String,

    /// Optional reply-to message ID
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub const fn text(channel_id: String, content: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: None,
        }
    }

    /// Create a `reply` message
    #[must_use]
    pub const fn reply(channel_id: String, content: String, reply_to: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: Some(reply_to),
        }
    }
}

/// Trait for text channel adapters
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &'static str;

    /// Connect to the channel
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from the channel
    async fn disconnect(&mut self) -> Result<()>;

    /// Send a message
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send typing indicator to show the bot is processing
    ///
    /// Default implementation is a no-op for channels that don't support typing
    async fn send_typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
}

/// A parsed text command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    Join(SessionMode),
    Leave,
    Reset,
    Play(String),
    Search(String),
}

impl TextCommand {
    /// Parse a message; `None` when it is not a command at all
    ///
    /// # Errors
    ///
    /// Returns `Error::CommandParse` for prefixed messages that are not valid
    /// commands
    pub fn parse(content: &str) -> Option<Result<Self>> {
        let body = content.trim().strip_prefix(COMMAND_PREFIX)?;
        let (name, arg) = body
            .trim_start()
            .split_once(char::is_whitespace)
            .map_or((body.trim(), ""), |(n, a)| (n, a.trim()));

        let command = match name.to_lowercase().as_str() {
            "join" => arg
                .parse::<SessionMode>()
                .map(Self::Join)
                .map_err(|e| Error::CommandParse(e.to_string())),
            "leave" => Ok(Self::Leave),
            "reset" => Ok(Self::Reset),
            "play" | "search" if arg.is_empty() => {
                Err(Error::CommandParse(format!("{name} needs a query")))
            }
            "play" => Ok(Self::Play(arg.to_string())),
            "search" => Ok(Self::Search(arg.to_string())),
            other => Err(Error::CommandParse(format!("unknown command: {other}"))),
        };
        Some(command)
    }
}

impl fmt::Display for TextCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Join(mode) => write!(f, "{COMMAND_PREFIX}join {mode}"),
            Self::Leave => write!(f, "{COMMAND_PREFIX}leave"),
            Self::Reset => write!(f, "{COMMAND_PREFIX}reset"),
            Self::Play(q) => write!(f, "{COMMAND_PREFIX}play {q}"),
            Self::Search(q) => write!(f, "{COMMAND_PREFIX}search {q}"),
        }
    }
}

/// Split `text` into messages of at most `limit` characters, on line breaks
/// where possible
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let mut line: Vec<char> = line.chars().collect();
        while line.len() > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(line.drain(..limit).collect());
        }
        let line: String = line.into_iter().collect();

        let needed = usize::from(!current.is_empty()) + line.chars().count();
        if current.chars().count() + needed > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            TextCommand::parse(">join").unwrap().unwrap(),
            TextCommand::Join(SessionMode::Normal)
        );
        assert_eq!(
            TextCommand::parse("> join transcribe").unwrap().unwrap(),
            TextCommand::Join(SessionMode::Transcribe)
        );
        assert_eq!(TextCommand::parse(">LEAVE").unwrap().unwrap(), TextCommand::Leave);
        assert_eq!(
            TextCommand::parse(">play  Daft Punk ").unwrap().unwrap(),
            TextCommand::Play("Daft Punk".to_string())
        );
    }

    #[test]
    fn ignores_plain_messages() {
        assert!(TextCommand::parse("hello there").is_none());
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(TextCommand::parse(">dance").unwrap().is_err());
        assert!(TextCommand::parse(">search").unwrap().is_err());
        assert!(TextCommand::parse(">join loud").unwrap().is_err());
    }

    #[test]
    fn split_respects_limit() {
        let text = "alpha\nbeta\ngamma\ndelta";
        assert_eq!(split_message(text, 11), vec!["alpha\nbeta", "gamma\ndelta"]);
        assert_eq!(split_message("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn session_key_prefers_guild() {
        let mut msg = IncomingMessage {
            id: "1".into(),
            channel_id: "chan".into(),
            guild_id: Some("guild".into()),
            sender_name: "alice".into(),
            content: ">join".into(),
        };
        assert_eq!(msg.session_key(), "guild");
        msg.guild_id = None;
        assert_eq!(msg.session_key(), "chan");
    }
}
