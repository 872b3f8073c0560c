//! Pretrained subword tokenizer boundary
//!
//! Thin wrapper over the `tokenizers` crate: encode text to ids, decode
//! ids back (optionally stripping special tokens), and surface the
//! vocabulary size and end-of-sequence id the model contract needs.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tokenizers::Tokenizer;

/// End-of-sequence markers probed in order when wrapping a tokenizer.
const EOS_CANDIDATES: &[&str] = &["<|endoftext|>", "</s>", "<eos>"];

pub struct TextTokenizer {
    inner: Tokenizer,
    eos_id: Option<i64>,
}

impl TextTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;
        Ok(Self::wrap(inner))
    }

    pub fn wrap(inner: Tokenizer) -> Self {
        let eos_id = EOS_CANDIDATES
            .iter()
            .find_map(|tok| inner.token_to_id(tok))
            .map(|id| id as i64);
        Self { inner, eos_id }
    }

    /// Vocabulary size including added special tokens. The model's
    /// configured vocab_size must equal this exactly.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn eos_id(&self) -> Option<i64> {
        self.eos_id
    }

    pub fn encode(&self, text: &str) -> Result<Vec<i64>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenizer encode failed: {}", e))?;
        Ok(encoding.get_ids().iter().map(|&id| id as i64).collect())
    }

    pub fn decode(&self, ids: &[i64], skip_special: bool) -> Result<String> {
        let ids: Vec<u32> = ids.iter().map(|&id| id as u32).collect();
        self.inner
            .decode(&ids, skip_special)
            .map_err(|e| anyhow!("Tokenizer decode failed: {}", e))
    }

    /// Tokenize a batch for training: truncate each text to `max_len`,
    /// pad to the longest row with the eos id (falling back to 0) and
    /// return ids plus the validity mask.
    pub fn encode_batch_padded(
        &self,
        texts: &[String],
        max_len: usize,
    ) -> Result<(Vec<Vec<i64>>, Vec<Vec<bool>>)> {
        anyhow::ensure!(!texts.is_empty(), "empty batch");
        let pad_id = self.eos_id.unwrap_or(0);

        let mut rows: Vec<Vec<i64>> = Vec::with_capacity(texts.len());
        for text in texts {
            let mut ids = self.encode(text).context("encoding training text")?;
            ids.truncate(max_len);
            rows.push(ids);
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        anyhow::ensure!(width > 1, "batch contains no usable tokens");

        let mut masks: Vec<Vec<bool>> = Vec::with_capacity(rows.len());
        for row in rows.iter_mut() {
            let mut mask = vec![true; row.len()];
            mask.resize(width, false);
            row.resize(width, pad_id);
            masks.push(mask);
        }

        Ok((rows, masks))
    }
}
