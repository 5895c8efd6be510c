//! Text tokenization for embedding models.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PicoError, Result};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Tokenization seam for the embedding engine.
pub trait Tokenize: Send + Sync {
    /// Tokenize a batch of texts to fixed-length id sequences.
    fn tokenize_batch(&self, texts: &[String], max_len: usize) -> Result<Vec<Vec<i64>>>;
}

/// Hugging Face tokenizer loaded from a `tokenizer.json` file.
pub struct TextTokenizer {
    inner: tokenizers::Tokenizer,
    max_length: usize,
}

impl TextTokenizer {
    /// Load a tokenizer from the given file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| PicoError::Memory(format!("loading tokenizer: {}", e)))?;
        Ok(Self {
            inner,
            max_length: 512,
        })
    }

    /// Tokenize one text: preprocess, encode with special tokens, then fix
    /// the length to `max_len` (truncate and right-pad with 0).
    pub fn tokenize(&self, text: &str, max_len: usize) -> Result<Vec<i64>> {
        let max_len = if max_len == 0 { self.max_length } else { max_len };
        let text = preprocess(text);

        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| PicoError::Memory(format!("tokenization failed: {}", e)))?;

        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        fix_length(&mut ids, max_len);
        Ok(ids)
    }
}

impl Tokenize for TextTokenizer {
    fn tokenize_batch(&self, texts: &[String], max_len: usize) -> Result<Vec<Vec<i64>>> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                self.tokenize(text, max_len)
                    .map_err(|e| PicoError::Memory(format!("failed to tokenize text {}: {}", i, e)))
            })
            .collect()
    }
}

/// Lowercase, trim, and collapse runs of whitespace to single spaces.
pub(crate) fn preprocess(text: &str) -> String {
    let text = text.to_lowercase();
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Truncate or right-pad with 0 so `ids.len() == max_len`.
pub(crate) fn fix_length(ids: &mut Vec<i64>, max_len: usize) {
    ids.truncate(max_len);
    while ids.len() < max_len {
        ids.push(0);
    }
}
