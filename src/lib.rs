//! Picobot - a multi-channel personal AI agent with local embedding memory

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod hub;
pub mod memory;
pub mod providers;
pub mod session;
pub mod skills;
pub mod tools;
pub mod utils;

pub use config::Config;
pub use error::{PicoError, Result};
pub use hub::{Hub, InboundMessage, OutboundMessage};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};
pub use session::{Message, Role, Session, SessionManager};
