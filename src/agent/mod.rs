//! Agent core - the reasoning loop and its context builder
//!
//! ```text
//! Hub.in ──> AgentLoop ──> LLMProvider
//!               │   ▲           │
//!               ▼   │           ▼
//!          SessionManager   ToolRegistry
//!               │
//!               ▼
//!        Persistent/File memory
//! ```

mod context;
mod r#loop;

pub use context::ContextBuilder;
pub use r#loop::AgentLoop;
