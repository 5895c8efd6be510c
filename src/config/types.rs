//! Configuration type definitions.
//!
//! All types implement serde with camelCase wire keys and carry sensible
//! defaults, so a partial config file works.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration for picobot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (model, tokens, iterations)
    pub agents: AgentsConfig,
    /// Channel configurations (Telegram, ntfy)
    pub channels: ChannelsConfig,
    /// LLM provider configurations
    pub providers: ProvidersConfig,
    /// Tool configuration (MCP servers)
    pub tools: ToolsConfig,
    /// Persistent memory configuration
    pub memory: MemoryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Default agent settings
    pub defaults: AgentDefaults,
}

/// Default agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentDefaults {
    /// Workspace directory path (supports `~`)
    pub workspace: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tool iterations per turn
    pub max_tool_iterations: usize,
    /// Heartbeat interval in seconds (0 disables)
    pub heartbeat_interval_s: u64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.picobot/workspace".to_string(),
            model: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_iterations: 10,
            heartbeat_interval_s: 0,
        }
    }
}

/// All channel configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Telegram bot configuration
    pub telegram: Option<TelegramConfig>,
    /// ntfy configuration
    pub ntfy: Option<NtfyConfig>,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Whether the channel is enabled
    pub enabled: bool,
    /// Bot API token
    pub token: String,
    /// Sender IDs allowed to talk to the bot (empty allows all)
    pub allow_from: Vec<String>,
}

/// ntfy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NtfyConfig {
    /// Whether the channel is enabled
    pub enabled: bool,
    /// Access token
    pub token: String,
    /// Server base URL
    pub server: String,
    /// Topic to subscribe and publish on
    pub topic: String,
}

/// Provider configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI-compatible provider
    pub openai: Option<ProviderConfig>,
}

/// A single provider's connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    /// API key for authentication
    pub api_key: String,
    /// Base URL override (empty uses the provider default)
    pub api_base: String,
    /// Per-request timeout in seconds; keeps long tool turns from timing out
    pub timeout: u64,
}

/// Tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// MCP remote-tool integration
    pub mcp: Option<McpConfig>,
}

/// MCP (Model Context Protocol) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Whether MCP tools are registered at startup
    pub enabled: bool,
    /// Server definitions keyed by name
    pub servers: HashMap<String, McpServerConfig>,
}

/// One MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Transport kind: "stdio" or "http"
    pub transport: String,
    /// Command to spawn (stdio transport)
    pub command: Option<String>,
    /// Command arguments (stdio transport)
    pub args: Vec<String>,
    /// Server URL (http transport)
    pub url: Option<String>,
    /// Extra request headers (http transport)
    pub headers: HashMap<String, String>,
}

/// Persistent memory configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Whether persistent memory is enabled
    pub enabled: bool,
    /// Embedding backend, e.g. "onnx"
    pub embed_type: String,
    /// Path to the SQLite database file (supports `~`)
    pub db_path: String,
    /// Path to the ONNX model file (supports `~`)
    pub onnx_model_path: String,
    /// Path to the tokenizer file (supports `~`)
    pub onnx_tokenizer_path: String,
    /// Similarity threshold for recall (0 selects the default 0.87)
    pub threshold: f64,
    /// Max items returned by a query (0 selects the default 10)
    pub top_k: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
