//! Discord channel adapter using serenity

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serenity::Client;
use serenity::all::{
    ChannelId, Context, CreateMessage, EventHandler, GatewayIntents, Message, MessageId,
    MessageReference, Ready,
};
use tokio::sync::mpsc;

use super::{COMMAND_PREFIX, Channel, IncomingMessage, OutgoingMessage, split_message};
use crate::{Error, Result};

/// Discord's per-message character cap
const MESSAGE_LIMIT: usize = 2000;

/// Discord channel adapter
pub struct DiscordChannel {
    token: SecretString,
    message_tx: mpsc::Sender<IncomingMessage>,
    http: Option<Arc<serenity::http::Http>>,
    connected: bool,
}

impl DiscordChannel {
    /// Create the adapter and a receiver for incoming commands
    #[must_use]
    pub fn with_receiver(token: SecretString) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let (tx, rx) = mpsc::channel(100);
        let channel = Self {
            token,
            message_tx: tx,
            http: None,
            connected: false,
        };
        (channel, rx)
    }

    fn http(&self) -> Result<&Arc<serenity::http::Http>> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::Channel("Discord not connected".to_string()))
    }
}

fn parse_channel_id(id: &str) -> Result<ChannelId> {
    id.parse::<u64>()
        .map(ChannelId::new)
        .map_err(|_| Error::Channel(format!("Invalid channel ID: {id}")))
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn connect(&mut self) -> Result<()> {
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = DiscordHandler {
            message_tx: self.message_tx.clone(),
        };

        let mut client = Client::builder(self.token.expose_secret(), intents)
            .event_handler(handler)
            .await
            .map_err(|e| Error::Channel(format!("Discord client error: {e}")))?;

        self.http = Some(client.http.clone());

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!(error = %e, "Discord client error");
            }
        });

        self.connected = true;
        tracing::info!("Discord channel connected");

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.http = None;
        tracing::info!("Discord channel disconnected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel_id(&message.channel_id)?;

        for (i, part) in split_message(&message.content, MESSAGE_LIMIT)
            .into_iter()
            .enumerate()
        {
            let mut builder = CreateMessage::new().content(part);
            if i == 0
                && let Some(reply_to) = message.reply_to.as_deref()
                && let Ok(id) = reply_to.parse::<u64>()
            {
                builder = builder.reference_message(MessageReference::from((
                    channel,
                    MessageId::new(id),
                )));
            }

            channel
                .send_message(http, builder)
                .await
                .map_err(|e| Error::Channel(format!("Discord send error: {e}")))?;
        }

        tracing::debug!(channel_id = %message.channel_id, "Discord message sent");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        let http = self.http()?;
        parse_channel_id(channel_id)?
            .broadcast_typing(http)
            .await
            .map_err(|e| Error::Channel(format!("Discord typing error: {e}")))?;

        tracing::debug!(channel_id, "Discord typing indicator sent");
        Ok(())
    }
}

/// Discord event handler
struct DiscordHandler {
    message_tx: mpsc::Sender<IncomingMessage>,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "Discord bot ready");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot || !msg.content.trim_start().starts_with(COMMAND_PREFIX) {
            return;
        }

        tracing::debug!(
            author = %msg.author.name,
            content = %msg.content,
            "Discord command received"
        );

        let incoming = IncomingMessage {
            id: msg.id.to_string(),
            channel_id: msg.channel_id.to_string(),
            guild_id: msg.guild_id.map(|g| g.to_string()),
            sender_name: msg.author.name.clone(),
            content: msg.content.clone(),
        };

        if let Err(e) = self.message_tx.send(incoming).await {
            tracing::warn!(error = %e, "Failed to forward Discord message");
        }
    }
}
