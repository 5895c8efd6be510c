//! Message types for the Picobot hub
//!
//! These are the envelopes exchanged between transports and the agent loop.
//! Both types are immutable once enqueued; builders exist for optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An incoming message from a transport (e.g. Telegram, ntfy, CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The transport this message came from (e.g. "telegram", "ntfy")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// When the transport received the message
    pub timestamp: DateTime<Utc>,
    /// Optional media references (URLs or local paths)
    #[serde(default)]
    pub media: Vec<String>,
    /// Additional transport-specific metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An outgoing message produced by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The transport to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Optional message ID to reply to
    pub reply_to: Option<String>,
    /// Optional media references
    #[serde(default)]
    pub media: Vec<String>,
    /// Additional transport-specific metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    /// Create a new inbound message, stamped with the current UTC time.
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a media reference (builder pattern).
    pub fn with_media(mut self, reference: &str) -> Self {
        self.media.push(reference.to_string());
        self
    }

    /// Add a metadata key-value pair (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Session key for this message: `"{channel}:{chat_id}"`.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the message ID to reply to (builder pattern).
    pub fn with_reply(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Create an outbound message addressed back to an inbound message's chat.
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self::new(&msg.channel, &msg.chat_id, content)
    }
}
