//! Multi-head self-attention with rotary position embeddings
//!
//! Stability measures kept from the reference setup:
//! - row-max subtraction before the softmax over keys
//! - large-negative additive masking instead of -inf
//!
//! The block is mask-agnostic: whatever additive bias it is given is
//! added to the scores before softmax. Causality is the caller's mask.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{Tensor, activation, backend::Backend};
use log::debug;

use crate::config::MoeGptConfig;
use crate::rope::RotaryEmbedding;

#[derive(Module, Debug)]
pub struct SelfAttention<B: Backend> {
    layer_idx: usize,
    n_head: usize,
    head_dim: usize,
    q_proj: Linear<B>,
    k_proj: Linear<B>,
    v_proj: Linear<B>,
    o_proj: Linear<B>,
    rotary: RotaryEmbedding<B>,
}

impl<B: Backend> SelfAttention<B> {
    pub fn new(config: &MoeGptConfig, layer_idx: usize, device: &B::Device) -> Self {
        let n_embd = config.n_embd;
        let n_head = config.n_head;
        let head_dim = config.head_dim();

        assert_eq!(n_embd % n_head, 0, "n_embd must be divisible by n_head");

        debug!(
            "Layer {}: attention n_head={}, head_dim={}",
            layer_idx, n_head, head_dim
        );

        let init = burn::nn::Initializer::KaimingUniform {
            gain: 0.5,
            fan_out_only: false,
        };

        Self {
            layer_idx,
            n_head,
            head_dim,
            q_proj: LinearConfig::new(n_embd, n_embd)
                .with_bias(false)
                .with_initializer(init.clone())
                .init(device),
            k_proj: LinearConfig::new(n_embd, n_embd)
                .with_bias(false)
                .with_initializer(init.clone())
                .init(device),
            v_proj: LinearConfig::new(n_embd, n_embd)
                .with_bias(false)
                .with_initializer(init.clone())
                .init(device),
            o_proj: LinearConfig::new(n_embd, n_embd)
                .with_bias(false)
                .with_initializer(init)
                .init(device),
            rotary: RotaryEmbedding::new(head_dim, config.sequence_len, 10000.0, device),
        }
    }

    /// `mask` is an additive bias broadcastable to [B, H, T, T]
    /// (large negative entries disallow positions).
    pub fn forward(&self, x: Tensor<B, 3>, mask: Option<&Tensor<B, 4>>) -> Tensor<B, 3> {
        let [b, t, c] = x.dims();
        debug!(
            "Layer {} attn forward: input [B={}, T={}, C={}]",
            self.layer_idx, b, t, c
        );

        let q = self
            .q_proj
            .forward(x.clone())
            .reshape([b, t, self.n_head, self.head_dim])
            .swap_dims(1, 2); // [B, H, T, D]
        let k = self
            .k_proj
            .forward(x.clone())
            .reshape([b, t, self.n_head, self.head_dim])
            .swap_dims(1, 2);
        let v = self
            .v_proj
            .forward(x)
            .reshape([b, t, self.n_head, self.head_dim])
            .swap_dims(1, 2);

        let (q, k) = self.rotary.apply(q, k, t);

        // Scores [B, H, T, T]
        let scale = (self.head_dim as f32).sqrt();
        let mut att = q.matmul(k.swap_dims(2, 3)) / scale;

        if let Some(mask) = mask {
            att = att + mask.clone();
        }

        // Subtract per-row max along the keys axis before the softmax
        let att_max = att.clone().max_dim(3);
        att = att - att_max;

        let att = activation::softmax(att, 3);

        let y = att.matmul(v); // [B, H, T, D]

        // Merge heads and project out
        let y = y.swap_dims(1, 2).reshape([b, t, c]);
        self.o_proj.forward(y)
    }
}
