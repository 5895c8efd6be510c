//! Memory subsystem
//!
//! Three layers with different lifetimes:
//! - `FileMemory`: markdown notes under the workspace (long-term `MEMORY.md`
//!   plus appendable daily notes), injected into the system prompt.
//! - `PersistentMemory`: SQLite-backed vector store holding embedded chat
//!   history, recalled by cosine similarity.
//! - The embedding engine: a local ONNX transformer that turns text into
//!   fixed-dimension vectors.

pub mod embedder;
pub mod files;
pub mod onnx;
pub mod persist;
pub mod ranker;

pub use embedder::{EmbedProvider, OnnxEmbedder};
pub use files::FileMemory;
pub use persist::PersistentMemory;
pub use ranker::{Ranker, SimilarityRanker};

use serde::{Deserialize, Serialize};

/// Where a recalled memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// SQLite-backed embedded history
    Persistent,
    /// Recent daily notes
    Short,
    /// Long-term MEMORY.md
    Long,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKind::Persistent => write!(f, "persistent"),
            MemoryKind::Short => write!(f, "short"),
            MemoryKind::Long => write!(f, "long"),
        }
    }
}

/// A recalled memory entry, scored against the current query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Role of the original speaker ("user", "assistant", "tool")
    pub role: String,
    /// The remembered text
    pub text: String,
    /// When the memory was recorded (RFC3339)
    pub timestamp: String,
    /// Cosine similarity against the query, in [-1, 1]
    pub similarity: f64,
    /// Which memory layer produced this item
    pub kind: MemoryKind,
}
