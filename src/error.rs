//! Error types for Picobot
//!
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for Picobot operations.
#[derive(Error, Debug)]
pub enum PicoError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider errors (API failures, rate limits, model errors, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Channel errors (routing failures, full queues, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (invalid state, persistence failures, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Memory subsystem errors (embedding, tokenization, vector storage)
    #[error("Memory error: {0}")]
    Memory(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors from the persistent memory store
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Hub queue closed unexpectedly
    #[error("Hub error: queue closed")]
    HubClosed,

    /// Operation interrupted by process shutdown
    #[error("Cancelled")]
    Cancelled,

    /// Resource not found (sessions, tools, transports, etc.)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A specialized `Result` type for Picobot operations.
pub type Result<T> = std::result::Result<T, PicoError>;
