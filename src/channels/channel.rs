//! The `Channel` trait and its message types.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a running channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// One inbound chat message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel name the message arrived on.
    pub channel: String,
    /// Platform identifier of the sending user.
    pub sender: String,
    /// Raw message text.
    pub content: String,
    /// Channel-specific extras (post id, chat id, ...).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, sender: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A reply to post back into the originating channel.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A chat boundary: produces inbound messages and posts replies.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short channel name for logs.
    fn name(&self) -> &str;

    /// Start listening. Returns the stream of inbound messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Post a reply for the given inbound message.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Verify the channel can reach its backing service.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop the channel.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
