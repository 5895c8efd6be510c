//! Tools callable by the LLM
//!
//! The sandboxed filesystem/exec/web tools and MCP wrappers live outside the
//! core; what lives here is the `Tool` contract they implement, the registry
//! that dispatches calls by name, and the built-in `message`, `write_memory`,
//! and `echo` tools.

mod registry;

pub mod memory;
pub mod message;

pub use memory::WriteMemoryTool;
pub use message::MessageTool;
pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A tool the LLM can call with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, used for dispatch.
    fn name(&self) -> &str;

    /// Description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute with the given arguments, returning the result text.
    async fn execute(&self, args: Value) -> Result<String>;

    /// Probe for the optional [`ContextAware`] capability.
    ///
    /// Stateful tools that need to know the originating channel and chat
    /// (message, cron) override this to return themselves.
    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        None
    }
}

/// Optional capability: receive the originating channel and chat before each
/// turn.
pub trait ContextAware: Send + Sync {
    /// Set the channel/chat the current message came from.
    fn set_context(&self, channel: &str, chat_id: &str);
}

/// A simple echo tool used by tests to exercise the tool loop.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided text"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("(no text)");
        Ok(text.to_string())
    }
}
