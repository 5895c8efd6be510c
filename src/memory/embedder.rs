//! Text embedding for the persistent memory store.
//!
//! Arbitrary-length content is split into word chunks, each chunk is embedded
//! by the engine, and the chunk vectors are arithmetic-meaned into one vector.

use tracing::warn;

use crate::error::{PicoError, Result};

use super::onnx::OnnxEmbeddingEngine;

/// Words per chunk for long-content embedding.
const CHUNK_MAX_WORDS: usize = 200;

/// Embedding seam consumed by [`super::PersistentMemory`].
pub trait EmbedProvider: Send + Sync {
    /// Embed one text into a fixed-dimension vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// [`EmbedProvider`] over a local ONNX embedding engine.
pub struct OnnxEmbedder {
    engine: OnnxEmbeddingEngine,
    chunk_max_words: usize,
}

impl OnnxEmbedder {
    /// Wrap an engine with the default chunking policy.
    pub fn new(engine: OnnxEmbeddingEngine) -> Self {
        Self {
            engine,
            chunk_max_words: CHUNK_MAX_WORDS,
        }
    }

    /// Access the underlying engine (dimension, stats).
    pub fn engine(&self) -> &OnnxEmbeddingEngine {
        &self.engine
    }
}

impl EmbedProvider for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let chunks = split_into_chunks(text, self.chunk_max_words);
        let vectors = self.engine.embed_batch(&chunks, 0)?;
        if vectors.is_empty() || vectors[0].is_empty() {
            return Err(PicoError::Memory(
                "no embeddings found in the response".to_string(),
            ));
        }
        Ok(average_embeddings(&vectors))
    }
}

/// Split text into chunks of at most `max_words` whitespace-separated words.
pub(crate) fn split_into_chunks(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Arithmetic mean of the given vectors.
///
/// Vectors whose dimension differs from the first are skipped with a warning.
pub(crate) fn average_embeddings(embeddings: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };
    if embeddings.len() == 1 {
        return first.clone();
    }

    let dim = first.len();
    let mut sum = vec![0.0f32; dim];
    let mut count = 0usize;
    for emb in embeddings {
        if emb.len() != dim {
            warn!(
                expected = dim,
                got = emb.len(),
                "embedding dimension mismatch, skipping chunk"
            );
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(emb) {
            *acc += v;
        }
        count += 1;
    }

    for v in sum.iter_mut() {
        *v /= count as f32;
    }
    sum
}
