//! LLM providers
//!
//! The agent loop talks to chat models through the `LLMProvider` trait. One
//! concrete adapter ships here: the OpenAI-compatible chat completions API.

pub mod openai;
mod types;

pub use openai::OpenAIProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};
