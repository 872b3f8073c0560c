//! Model hyperparameters
//!
//! One immutable value object created at model construction, serialized
//! alongside checkpoints so a model can be rebuilt before loading weights.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MoeGptConfig {
    /// Must match the tokenizer's vocabulary size exactly.
    pub vocab_size: usize,
    /// Hidden width; must be divisible by `n_head`.
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    /// Number of expert feed-forward networks per layer.
    pub n_expert: usize,
    /// Experts selected per token; at most `n_expert`.
    pub top_k: usize,
    pub rms_eps: f32,
    /// Longest sequence the rotary tables cover.
    pub sequence_len: usize,
    /// Share the embedding matrix with the output projection.
    pub tie_embeddings: bool,
}

impl MoeGptConfig {
    /// Construction-time contract checks. Violations are fatal, not
    /// recoverable (shape mismatches would corrupt every forward pass).
    pub fn validate(&self) {
        assert!(self.vocab_size > 0, "vocab_size must be > 0");
        assert!(self.n_layer > 0, "n_layer must be > 0");
        assert_eq!(
            self.n_embd % self.n_head,
            0,
            "n_embd ({}) must be divisible by n_head ({})",
            self.n_embd,
            self.n_head
        );
        let head_dim = self.n_embd / self.n_head;
        assert_eq!(
            head_dim % 2,
            0,
            "head_dim ({}) must be even: rotary embeddings rotate coordinate pairs",
            head_dim
        );
        assert!(
            self.top_k >= 1 && self.top_k <= self.n_expert,
            "top_k ({}) must be in 1..={}",
            self.top_k,
            self.n_expert
        );
        assert!(self.sequence_len > 0, "sequence_len must be > 0");
    }

    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }
}

impl Default for MoeGptConfig {
    /// Hyperparameters of the reference pretraining run.
    fn default() -> Self {
        Self {
            vocab_size: 49152,
            n_embd: 576,
            n_layer: 30,
            n_head: 9,
            n_expert: 8,
            top_k: 2,
            rms_eps: 1e-5,
            sequence_len: 512,
            tie_embeddings: true,
        }
    }
}
