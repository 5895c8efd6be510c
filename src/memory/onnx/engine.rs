//! Embedding engine: tokenize, run the model, pool, normalize.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{PicoError, Result};

use super::runtime::OrtSession;
use super::stats::{InferenceStats, StatsSnapshot};
use super::tokenizer::{TextTokenizer, Tokenize};

/// How token-level outputs are reduced to one vector per text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolingStrategy {
    /// Take the embedding at position 0 (the CLS token).
    #[default]
    Cls,
    /// Arithmetic mean over the sequence dimension.
    Mean,
    /// Element-wise max over the sequence dimension.
    Max,
}

impl FromStr for PoolingStrategy {
    type Err = PicoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "cls" | "first" => Ok(PoolingStrategy::Cls),
            "mean" | "average" => Ok(PoolingStrategy::Mean),
            "max" => Ok(PoolingStrategy::Max),
            other => Err(PicoError::Memory(format!(
                "unknown pooling strategy: {}",
                other
            ))),
        }
    }
}

/// Configuration for the embedding model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Path to the ONNX model file
    pub path: PathBuf,
    /// Path to the tokenizer file
    pub tokenizer_path: PathBuf,
    /// Batch size for `embed_batch` (default 32)
    pub batch_size: usize,
    /// Fixed token sequence length (default 512)
    pub max_tokens: usize,
    /// Pooling strategy for token-level outputs
    pub pooling: PoolingStrategy,
    /// L2-normalize output vectors (required for the dot-product similarity
    /// fast path)
    pub normalize: bool,
}

impl ModelConfig {
    /// Build a config with the standard defaults for the given files.
    pub fn new(path: impl Into<PathBuf>, tokenizer_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokenizer_path: tokenizer_path.into(),
            batch_size: 32,
            max_tokens: 512,
            pooling: PoolingStrategy::Cls,
            normalize: true,
        }
    }
}

/// Input tensors for one inference run, flattened row-major.
pub struct SessionInput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub batch: usize,
    pub seq_len: usize,
}

/// Raw model output: `[batch, seq, hidden]` token-level or `[batch, hidden]`
/// pre-pooled, flattened row-major.
pub struct SessionOutput {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

/// Inference backend seam. The production implementation is [`OrtSession`];
/// tests substitute a scripted session.
pub trait InferenceSession: Send + Sync {
    /// How many inputs the model declares (decides whether attention mask
    /// and token type ids are fed).
    fn input_count(&self) -> usize;

    /// Run the model on one batch.
    fn run(&self, input: &SessionInput) -> Result<SessionOutput>;
}

/// Embedding generation over a local ONNX model.
pub struct OnnxEmbeddingEngine {
    config: ModelConfig,
    tokenizer: Box<dyn Tokenize>,
    session: Box<dyn InferenceSession>,
    stats: InferenceStats,
    dimension: AtomicUsize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl OnnxEmbeddingEngine {
    /// Load the model and tokenizer from the configured paths.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let tokenizer = TextTokenizer::from_file(&config.tokenizer_path)?;
        let session = OrtSession::load(&config.path)?;
        Ok(Self::with_parts(config, Box::new(tokenizer), Box::new(session)))
    }

    /// Assemble an engine from explicit parts (used by tests).
    pub fn with_parts(
        mut config: ModelConfig,
        tokenizer: Box<dyn Tokenize>,
        session: Box<dyn InferenceSession>,
    ) -> Self {
        if config.batch_size == 0 {
            config.batch_size = 32;
        }
        if config.max_tokens == 0 {
            config.max_tokens = 512;
        }
        Self {
            config,
            tokenizer,
            session,
            stats: InferenceStats::new(),
            dimension: AtomicUsize::new(0),
            shutdown: None,
        }
    }

    /// Wire the engine to the process shutdown signal so long batch runs can
    /// short-circuit.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Embedding dimension, discovered at first inference (0 before that).
    pub fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    /// Snapshot of the inference statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Embed one batch of texts. Each output vector has the model's hidden
    /// dimension.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(PicoError::Memory("no content provided".to_string()));
        }
        if self.cancelled() {
            return Err(PicoError::Cancelled);
        }

        let start = Instant::now();

        let tokens = match self.tokenizer.tokenize_batch(texts, self.config.max_tokens) {
            Ok(t) => t,
            Err(e) => {
                self.stats.record_error();
                return Err(e);
            }
        };

        let input = build_input(&tokens);
        let token_count = input.attention_mask.iter().filter(|&&m| m != 0).count();

        let output = match self.session.run(&input) {
            Ok(o) => o,
            Err(e) => {
                self.stats.record_error();
                return Err(e);
            }
        };

        let mut embeddings = match extract_embeddings(&output, self.config.pooling) {
            Ok(e) => e,
            Err(e) => {
                self.stats.record_error();
                return Err(e);
            }
        };

        if self.config.normalize {
            for vec in embeddings.iter_mut() {
                l2_normalize(vec);
            }
        }

        if let Some(first) = embeddings.first() {
            self.dimension.store(first.len(), Ordering::Relaxed);
        }

        self.stats.record_inference(token_count, start.elapsed());
        debug!(
            texts = texts.len(),
            tokens = token_count,
            "Embedded batch"
        );
        Ok(embeddings)
    }

    /// Embed texts in chunks of `batch_size` (0 means the configured size),
    /// short-circuiting if the shutdown signal fires between chunks. Returns
    /// the concatenated embeddings in input order.
    pub fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let batch_size = if batch_size == 0 {
            self.config.batch_size
        } else {
            batch_size
        };

        let mut all = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(batch_size).enumerate() {
            if self.cancelled() {
                return Err(PicoError::Cancelled);
            }
            let embeddings = self.embed(chunk).map_err(|e| {
                PicoError::Memory(format!(
                    "batch processing failed at index {}: {}",
                    i * batch_size,
                    e
                ))
            })?;
            all.extend(embeddings);
        }
        Ok(all)
    }
}

/// Build the flattened input tensors for a tokenized batch.
///
/// The attention mask is 1 where the token is non-zero; token type ids are
/// all zeros.
fn build_input(tokens: &[Vec<i64>]) -> SessionInput {
    let batch = tokens.len();
    let seq_len = tokens.first().map(|t| t.len()).unwrap_or(0);

    let mut input_ids = Vec::with_capacity(batch * seq_len);
    let mut attention_mask = Vec::with_capacity(batch * seq_len);
    for seq in tokens {
        for &id in seq {
            input_ids.push(id);
            attention_mask.push(if id != 0 { 1 } else { 0 });
        }
    }

    SessionInput {
        input_ids,
        attention_mask,
        token_type_ids: vec![0; batch * seq_len],
        batch,
        seq_len,
    }
}

/// Reduce the raw model output to one vector per text.
fn extract_embeddings(output: &SessionOutput, pooling: PoolingStrategy) -> Result<Vec<Vec<f32>>> {
    match output.shape.as_slice() {
        // Token-level output: pool over the sequence dimension.
        [batch, seq, hidden] => {
            let (batch, seq, hidden) = (*batch, *seq, *hidden);
            if output.data.len() != batch * seq * hidden {
                return Err(PicoError::Memory("output tensor size mismatch".to_string()));
            }
            let mut out = Vec::with_capacity(batch);
            for b in 0..batch {
                let rows = &output.data[b * seq * hidden..(b + 1) * seq * hidden];
                out.push(match pooling {
                    PoolingStrategy::Cls => rows[..hidden].to_vec(),
                    PoolingStrategy::Mean => pool_mean(rows, seq, hidden),
                    PoolingStrategy::Max => pool_max(rows, seq, hidden),
                });
            }
            Ok(out)
        }
        // Already pooled by the model.
        [batch, hidden] => {
            let (batch, hidden) = (*batch, *hidden);
            if output.data.len() != batch * hidden {
                return Err(PicoError::Memory("output tensor size mismatch".to_string()));
            }
            Ok(output
                .data
                .chunks(hidden)
                .map(|row| row.to_vec())
                .collect())
        }
        other => Err(PicoError::Memory(format!(
            "unexpected output shape: {:?}",
            other
        ))),
    }
}

fn pool_mean(rows: &[f32], seq: usize, hidden: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; hidden];
    for s in 0..seq {
        for h in 0..hidden {
            out[h] += rows[s * hidden + h];
        }
    }
    for v in out.iter_mut() {
        *v /= seq as f32;
    }
    out
}

fn pool_max(rows: &[f32], seq: usize, hidden: usize) -> Vec<f32> {
    let mut out = rows[..hidden].to_vec();
    for s in 1..seq {
        for h in 0..hidden {
            out[h] = out[h].max(rows[s * hidden + h]);
        }
    }
    out
}

/// Normalize a vector to unit length in place. Zero vectors are left as-is.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
