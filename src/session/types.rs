//! Session types
//!
//! Conversation state: messages, roles, tool calls, and the rolling session
//! history with its trim policy.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of messages kept in a session.
///
/// Older messages are trimmed on save and handed to persistent memory for
/// archival. Important facts belong in `write_memory`, not session history.
pub const MAX_HISTORY_SIZE: usize = 50;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
    /// Results from tool executions
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// A single message in a conversation.
///
/// Timestamps are RFC3339 strings in UTC, stamped at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// When the message was created (RFC3339)
    pub timestamp: String,
    /// Tool calls made by the assistant (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message responds to (for tool results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Message {
    fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: now_rfc3339(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message responding to the given call.
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Check if this message has tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// A conversation session holding a short rolling history.
///
/// Keyed by `"{channel}:{chat_id}"`. After every trim,
/// `history.len() <= MAX_HISTORY_SIZE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session (e.g. "telegram:chat123")
    pub key: String,
    /// Ordered list of messages in this conversation
    pub history: Vec<Message>,
}

impl Session {
    /// Create a new empty session with the given key.
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            history: Vec::new(),
        }
    }

    /// Append a message stamped with the current UTC time.
    pub fn add_message(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Trim history to the most recent `MAX_HISTORY_SIZE` messages.
    ///
    /// Returns the discarded prefix (oldest messages first); empty when no
    /// trimming was needed.
    pub fn trim(&mut self) -> Vec<Message> {
        if self.history.len() > MAX_HISTORY_SIZE {
            let split = self.history.len() - MAX_HISTORY_SIZE;
            let tail = self.history.split_off(split);
            std::mem::replace(&mut self.history, tail)
        } else {
            Vec::new()
        }
    }

    /// Number of messages currently held.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Check if this session has no messages.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
