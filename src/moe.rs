//! Mixture-of-experts feed-forward layer
//!
//! Each token is routed to its `top_k` highest-probability experts; the
//! selected probabilities are renormalized to sum to 1 and weight the
//! expert outputs. A load-balance penalty is returned alongside the
//! hidden state: (ln E - entropy of the expert usage distribution), zero
//! when usage is uniform and growing as routing collapses onto few
//! experts. The absolute value guards against floating-point sign flips
//! near zero.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{Int, Tensor, TensorData, activation, backend::Backend};
use log::debug;

use crate::config::MoeGptConfig;

const LOG_EPS: f32 = 1e-10;

/// One expert: Linear -> GELU -> Linear at 4x expansion.
#[derive(Module, Debug)]
pub struct Expert<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> Expert<B> {
    pub fn new(n_embd: usize, device: &B::Device) -> Self {
        let init = burn::nn::Initializer::KaimingUniform {
            gain: 0.5,
            fan_out_only: false,
        };
        Self {
            fc1: LinearConfig::new(n_embd, 4 * n_embd)
                .with_initializer(init.clone())
                .init(device),
            fc2: LinearConfig::new(4 * n_embd, n_embd)
                .with_initializer(init)
                .init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(x);
        let x = activation::gelu(x);
        self.fc2.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct MixtureOfExperts<B: Backend> {
    router: Linear<B>,
    experts: Vec<Expert<B>>,
    n_expert: usize,
    top_k: usize,
}

impl<B: Backend> MixtureOfExperts<B> {
    pub fn new(config: &MoeGptConfig, device: &B::Device) -> Self {
        assert!(
            config.top_k >= 1 && config.top_k <= config.n_expert,
            "top_k must be in 1..=n_expert"
        );
        debug!(
            "MoE init: n_expert={}, top_k={}, n_embd={}",
            config.n_expert, config.top_k, config.n_embd
        );

        Self {
            router: LinearConfig::new(config.n_embd, config.n_expert).init(device),
            experts: (0..config.n_expert)
                .map(|_| Expert::new(config.n_embd, device))
                .collect(),
            n_expert: config.n_expert,
            top_k: config.top_k,
        }
    }

    /// Route `x` [B, T, C] through the selected experts.
    ///
    /// Returns the combined output (same shape) and the scalar auxiliary
    /// load-balance loss for this call. The loss is a per-call value, not
    /// module state, so aggregation is a pure reduction over layers.
    pub fn forward(&self, x: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 1>) {
        let [b, t, c] = x.dims();
        let device = x.device();
        let n_tokens = b * t;

        let router_logits = self.router.forward(x.clone()); // [B, T, E]
        let router_probs = activation::softmax(router_logits, 2);
        let (weights, top_idx) = self.route(router_probs.clone());

        let x_flat = x.reshape([n_tokens, c]);
        let weights_flat = weights.reshape([n_tokens, self.top_k]);
        let idx_host: Vec<i64> = top_idx
            .reshape([n_tokens * self.top_k])
            .to_data()
            .to_vec()
            .unwrap();

        let mut out_flat = Tensor::zeros([n_tokens, c], &device);

        // For each selection slot, gather the tokens routed to each expert,
        // run them through it and scatter-add the weighted result back.
        for slot in 0..self.top_k {
            for expert_idx in 0..self.n_expert {
                let rows: Vec<i64> = (0..n_tokens)
                    .filter(|tok| idx_host[tok * self.top_k + slot] == expert_idx as i64)
                    .map(|tok| tok as i64)
                    .collect();
                if rows.is_empty() {
                    continue;
                }
                let n_rows = rows.len();
                let rows_t =
                    Tensor::<B, 1, Int>::from_data(TensorData::new(rows, [n_rows]), &device);

                let gathered = x_flat.clone().select(0, rows_t.clone());
                let expert_out = self.experts[expert_idx].forward(gathered);

                let w = weights_flat
                    .clone()
                    .select(0, rows_t.clone())
                    .slice([0..n_rows, slot..slot + 1]); // [n_rows, 1]

                out_flat = out_flat.select_assign(0, rows_t, expert_out * w);
            }
        }

        let aux = self.load_balance_loss(router_probs);

        (out_flat.reshape([b, t, c]), aux)
    }

    /// Routing decision for the given router probabilities [B, T, E]:
    /// top-k expert indices and renormalized weights per token. Weights
    /// over the selected k experts sum to 1.
    pub fn route(&self, router_probs: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3, Int>) {
        let (top_vals, top_idx) = router_probs.topk_with_indices(self.top_k, 2);
        let denom = top_vals.clone().sum_dim(2); // [B, T, 1]
        (top_vals / denom, top_idx)
    }

    /// Router probability distribution over experts for `x` [B, T, C].
    pub fn router_probs(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        activation::softmax(self.router.forward(x), 2)
    }

    /// (ln E - entropy) of the batch-and-sequence-averaged expert usage
    /// distribution. `LOG_EPS` keeps log(0) out of the computation.
    fn load_balance_loss(&self, router_probs: Tensor<B, 3>) -> Tensor<B, 1> {
        let [b, _t, e] = router_probs.dims();

        let per_batch = router_probs.mean_dim(1).reshape([b, e]); // avg over sequence
        let usage = per_batch.sum_dim(0).reshape([e]); // [E]
        let usage = usage.clone() / usage.sum().expand([e]);

        // sum(u * ln u) = -entropy; ln E + it is >= 0 up to fp error
        let neg_entropy = (usage.clone() * (usage + LOG_EPS).log()).sum();
        let max_entropy = (self.n_expert as f32).ln();

        (neg_entropy + max_entropy).abs()
    }
}
