//! Message tool: lets the model push a message to a chat channel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{PicoError, Result};
use crate::hub::{Hub, OutboundMessage};

use super::{ContextAware, Tool};

/// Sends outbound messages onto the hub.
///
/// The agent loop sets the originating channel/chat before each turn via
/// [`ContextAware`], so the model can omit them when replying in place.
pub struct MessageTool {
    hub: Arc<Hub>,
    context: Mutex<Option<(String, String)>>,
}

impl MessageTool {
    /// Create a message tool over the given hub.
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            context: Mutex::new(None),
        }
    }

    fn current_context(&self) -> Option<(String, String)> {
        self.context.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ContextAware for MessageTool {
    fn set_context(&self, channel: &str, chat_id: &str) {
        let mut ctx = self.context.lock().unwrap_or_else(|e| e.into_inner());
        *ctx = Some((channel.to_string(), chat_id.to_string()));
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to a specific chat channel. Omit channel and chat_id \
         to target the conversation the current message came from."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Message text to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Destination channel (telegram, ntfy). Defaults to the originating channel."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Destination chat ID. Defaults to the originating chat."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PicoError::Tool("missing 'content' parameter".to_string()))?;

        let ctx = self.current_context();
        let channel = args
            .get("channel")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.as_ref().map(|(c, _)| c.clone()))
            .ok_or_else(|| PicoError::Tool("no target channel specified".to_string()))?;
        let chat_id = args
            .get("chat_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.as_ref().map(|(_, id)| id.clone()))
            .ok_or_else(|| PicoError::Tool("no target chat_id specified".to_string()))?;

        let outbound = OutboundMessage::new(&channel, &chat_id, content);
        if let Err(e) = self.hub.try_publish_outbound(outbound) {
            warn!(channel = %channel, chat_id = %chat_id, error = %e, "Dropping message tool send");
            return Err(PicoError::Tool(format!("failed to send message: {}", e)));
        }

        Ok(format!("Message sent to {}:{}", channel, chat_id))
    }

    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }
}
