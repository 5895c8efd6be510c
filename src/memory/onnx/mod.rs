//! Local ONNX embedding inference
//!
//! Wraps a transformer embedding model for inference only: tokenization,
//! tensor construction, pooling, and normalization. The ONNX Runtime session
//! sits behind the `InferenceSession` trait so the pipeline can be exercised
//! without a model file.

pub mod engine;
pub mod runtime;
pub mod stats;
pub mod tokenizer;

pub use engine::{
    InferenceSession, ModelConfig, OnnxEmbeddingEngine, PoolingStrategy, SessionInput,
    SessionOutput,
};
pub use runtime::OrtSession;
pub use stats::{InferenceStats, StatsSnapshot};
pub use tokenizer::{TextTokenizer, Tokenize};
