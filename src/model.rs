//! Decoder stack and causal LM head
//!
//! Embedding lookup, N pre-norm residual layers (attention then expert
//! mixture), final RMS norm, and a vocabulary projection that optionally
//! reuses the embedding matrix (weight tying: one parameter, two usage
//! sites).
//!
//! This is a causal language model: `forward` always constructs the
//! causal additive mask and merges an optional padding mask into it
//! before handing it to the mask-agnostic attention blocks.

use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::{Bool, Int, Tensor, TensorData, backend::Backend};
use log::{debug, info};

use crate::attention::SelfAttention;
use crate::config::MoeGptConfig;
use crate::moe::MixtureOfExperts;
use crate::norm::RmsNorm;

/// Weight on the summed per-layer auxiliary losses in the training loss.
const AUX_LOSS_WEIGHT: f32 = 0.01;

const MASK_NEG: f32 = -1.0e9;

/// Large-negative additive causal mask [1, 1, T, T]: position t may only
/// attend to positions <= t.
pub fn causal_mask<B: Backend>(t: usize, device: &B::Device) -> Tensor<B, 4> {
    // tril_mask is FALSE on and below the diagonal (allowed), TRUE above
    // (blocked); mask_fill writes where TRUE.
    let blocked: Tensor<B, 2, Bool> = Tensor::tril_mask([t, t], 0, device);
    Tensor::<B, 2>::zeros([t, t], device)
        .mask_fill(blocked, MASK_NEG)
        .reshape([1, 1, t, t])
}

/// Additive padding mask [B, 1, 1, T] from a validity mask [B, T]
/// (true = real token). Padded key positions get a large negative bias.
pub fn padding_mask<B: Backend>(valid: Tensor<B, 2, Bool>) -> Tensor<B, 4> {
    let [b, t] = valid.dims();
    let device = valid.device();
    Tensor::<B, 2>::zeros([b, t], &device)
        .mask_fill(valid.bool_not(), MASK_NEG)
        .reshape([b, 1, 1, t])
}

/// One residual block: norm -> attention -> add; norm -> MoE -> add.
/// State-free; the auxiliary loss is part of the return value.
#[derive(Module, Debug)]
pub struct DecoderLayer<B: Backend> {
    attn_norm: RmsNorm<B>,
    attn: SelfAttention<B>,
    moe_norm: RmsNorm<B>,
    moe: MixtureOfExperts<B>,
}

impl<B: Backend> DecoderLayer<B> {
    pub fn new(config: &MoeGptConfig, layer_idx: usize, device: &B::Device) -> Self {
        debug!("Initializing decoder layer {}", layer_idx);
        Self {
            attn_norm: RmsNorm::new(config.n_embd, config.rms_eps, device),
            attn: SelfAttention::new(config, layer_idx, device),
            moe_norm: RmsNorm::new(config.n_embd, config.rms_eps, device),
            moe: MixtureOfExperts::new(config, device),
        }
    }

    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        mask: Option<&Tensor<B, 4>>,
    ) -> (Tensor<B, 3>, Tensor<B, 1>) {
        let x = x.clone() + self.attn.forward(self.attn_norm.forward(x), mask);
        let (moe_out, aux) = self.moe.forward(self.moe_norm.forward(x.clone()));
        (x + moe_out, aux)
    }
}

#[derive(Module, Debug)]
pub struct MoeGpt<B: Backend> {
    wte: Embedding<B>,
    layers: Vec<DecoderLayer<B>>,
    final_norm: RmsNorm<B>,
    /// None when embeddings are tied: the embedding matrix is then used
    /// transposed as the output projection.
    lm_head: Option<Linear<B>>,
    n_embd: usize,
    vocab_size: usize,
}

impl<B: Backend> MoeGpt<B> {
    pub fn new(config: &MoeGptConfig, device: &B::Device) -> Self {
        config.validate();

        info!(
            "Initializing MoeGpt: vocab={}, n_embd={}, n_layer={}, n_head={}, n_expert={}, top_k={}, tied={}",
            config.vocab_size,
            config.n_embd,
            config.n_layer,
            config.n_head,
            config.n_expert,
            config.top_k,
            config.tie_embeddings
        );

        let wte = EmbeddingConfig::new(config.vocab_size, config.n_embd).init(device);

        let layers = (0..config.n_layer)
            .map(|i| DecoderLayer::new(config, i, device))
            .collect();

        let lm_head = if config.tie_embeddings {
            None
        } else {
            Some(
                LinearConfig::new(config.n_embd, config.vocab_size)
                    .with_bias(false)
                    .with_initializer(burn::nn::Initializer::KaimingUniform {
                        gain: 0.5,
                        fan_out_only: false,
                    })
                    .init(device),
            )
        };

        Self {
            wte,
            layers,
            final_norm: RmsNorm::new(config.n_embd, config.rms_eps, device),
            lm_head,
            n_embd: config.n_embd,
            vocab_size: config.vocab_size,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Hidden states after the full decoder stack, plus the summed
    /// auxiliary loss across layers.
    fn decode(
        &self,
        input_ids: Tensor<B, 2, Int>,
        valid_mask: Option<Tensor<B, 2, Bool>>,
    ) -> (Tensor<B, 3>, Tensor<B, 1>) {
        let [b, t] = input_ids.dims();
        assert!(t > 0, "sequence length must be > 0");
        let device = input_ids.device();

        let mut mask = causal_mask::<B>(t, &device);
        if let Some(valid) = valid_mask {
            mask = mask + padding_mask(valid); // broadcasts to [B, 1, T, T]
        }

        let mut x = self.wte.forward(input_ids);
        debug!("After embedding: {:?}", x.dims());

        let mut aux_total = Tensor::zeros([1], &device);
        for (i, layer) in self.layers.iter().enumerate() {
            let (next, aux) = layer.forward(x, Some(&mask));
            x = next;
            aux_total = aux_total + aux;
            debug!("After layer {}: {:?}", i, x.dims());
        }

        let x = self.final_norm.forward(x);
        debug_assert_eq!(x.dims(), [b, t, self.n_embd]);
        (x, aux_total)
    }

    fn project_vocab(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match &self.lm_head {
            Some(head) => head.forward(x),
            // Tied: the embedding matrix [V, C] used transposed
            None => {
                let [b, _t, c] = x.dims();
                let w = self
                    .wte
                    .weight
                    .val()
                    .transpose()
                    .unsqueeze::<3>()
                    .expand([b, c, self.vocab_size]);
                x.matmul(w)
            }
        }
    }

    /// Logits [B, T, V]. `valid_mask` marks real (non-padded) tokens.
    pub fn forward(
        &self,
        input_ids: Tensor<B, 2, Int>,
        valid_mask: Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 3> {
        let (hidden, _aux) = self.decode(input_ids, valid_mask);
        self.project_vocab(hidden)
    }

    /// Training loss: shifted mean cross-entropy over non-padded positions
    /// plus the weighted sum of every layer's auxiliary loss.
    pub fn forward_loss(
        &self,
        input_ids: Tensor<B, 2, Int>,
        labels: Tensor<B, 2, Int>,
        valid_mask: Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 1> {
        let [b, t] = input_ids.dims();
        assert!(t > 1, "loss needs at least two positions to shift");
        let device = input_ids.device();

        let (hidden, aux_total) = self.decode(input_ids, valid_mask.clone());
        let logits = self.project_vocab(hidden);

        // Predict token t+1 from position t
        let n = b * (t - 1);
        let shift_logits = logits
            .slice([0..b, 0..t - 1, 0..self.vocab_size])
            .reshape([n, self.vocab_size]);
        let shift_labels = labels.slice([0..b, 1..t]).reshape([n]);

        // Keep only positions whose target token is real
        let (shift_logits, shift_labels) = match valid_mask {
            Some(valid) => {
                let keep_host: Vec<bool> = valid
                    .slice([0..b, 1..t])
                    .reshape([n])
                    .to_data()
                    .to_vec()
                    .unwrap();
                let keep: Vec<i64> = keep_host
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v)
                    .map(|(i, _)| i as i64)
                    .collect();
                assert!(!keep.is_empty(), "all label positions are padding");
                let n_keep = keep.len();
                let keep_t =
                    Tensor::<B, 1, Int>::from_data(TensorData::new(keep, [n_keep]), &device);
                (
                    shift_logits.select(0, keep_t.clone()),
                    shift_labels.select(0, keep_t),
                )
            }
            None => (shift_logits, shift_labels),
        };

        let ce = CrossEntropyLossConfig::new()
            .init(&device)
            .forward(shift_logits, shift_labels);

        ce + aux_total * AUX_LOSS_WEIGHT
    }

    pub fn check_logits_health(logits: &Tensor<B, 3>) -> bool {
        let vec: Vec<f32> = logits.clone().to_data().to_vec().unwrap();
        vec.iter().all(|&x| x.is_finite())
    }
}
