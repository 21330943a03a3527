//! Channel integration tests
//!
//! Tests the text command flow with a mock channel

use std::sync::Arc;

use async_trait::async_trait;
use huddle::Orchestrator;
use huddle::channels::{Channel, IncomingMessage, OutgoingMessage, TextCommand, split_message};
use huddle::daemon::handle_channel_messages;
use huddle::session::SessionMode;
use tokio::sync::{Mutex, mpsc};

mod common;
use common::{Harness, MockLinkFactory};

/// Mock channel for testing
struct MockChannel {
    name: &'static str,
    connected: bool,
    sent_messages: Arc<Mutex<Vec<OutgoingMessage>>>,
}

impl MockChannel {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            connected: false,
            sent_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn connect(&mut self) -> huddle::Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> huddle::Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> huddle::Result<()> {
        self.sent_messages.lock().await.push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn message(id: &str, guild: Option<&str>, content: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        channel_id: "text-1".to_string(),
        guild_id: guild.map(ToString::to_string),
        sender_name: "alice".to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn test_mock_channel_connect_disconnect() {
    let mut channel = MockChannel::new("test");

    assert!(!channel.is_connected());

    channel.connect().await.unwrap();
    assert!(channel.is_connected());

    channel.disconnect().await.unwrap();
    assert!(!channel.is_connected());
}

#[test]
fn test_session_key_prefers_guild() {
    assert_eq!(message("1", Some("guild-9"), ">join").session_key(), "guild-9");
    assert_eq!(message("1", None, ">join").session_key(), "text-1");
}

#[test]
fn test_command_parsing() {
    assert_eq!(
        TextCommand::parse(">join silent").unwrap().unwrap(),
        TextCommand::Join(SessionMode::Silent)
    );
    assert_eq!(
        TextCommand::parse(">search weather in Oslo").unwrap().unwrap(),
        TextCommand::Search("weather in Oslo".to_string())
    );
    assert!(TextCommand::parse("join").is_none());
    assert!(TextCommand::parse(">play").unwrap().is_err());
}

#[test]
fn test_long_replies_are_split() {
    let line = "word ".repeat(90);
    let text = format!("{line}\n{line}\n{line}");
    let parts = split_message(&text, 1000);

    assert_eq!(parts.len(), 2);
    assert!(parts.iter().all(|p| p.chars().count() <= 1000));
}

#[tokio::test]
async fn test_text_commands_get_replies() {
    let harness = Harness::new();
    let factory = Arc::new(MockLinkFactory::default());
    let orchestrator = Arc::new(Orchestrator::new(factory.clone(), harness.services.clone()));

    let channel = MockChannel::new("mock");
    let sent = Arc::clone(&channel.sent_messages);
    let (tx, rx) = mpsc::channel(8);

    tx.send(message("m1", Some("guild-1"), ">join free")).await.unwrap();
    tx.send(message("m2", Some("guild-1"), "just chatting")).await.unwrap();
    tx.send(message("m3", Some("guild-1"), ">dance")).await.unwrap();
    tx.send(message("m4", Some("guild-1"), ">leave")).await.unwrap();
    drop(tx);

    handle_channel_messages(rx, channel, Arc::clone(&orchestrator)).await;

    let sent = sent.lock().await;
    let replies: Vec<(&str, &str)> = sent
        .iter()
        .map(|m| (m.reply_to.as_deref().unwrap_or(""), m.content.as_str()))
        .collect();
    assert_eq!(
        replies,
        vec![
            ("m1", "Joined voice chat in free mode."),
            ("m3", "Sorry, could not parse command: unknown command: dance."),
            ("m4", "Left voice chat."),
        ]
    );
    assert!(factory.link("guild-1").unwrap().is_disconnected());
    assert!(orchestrator.channels().await.is_empty());
}
