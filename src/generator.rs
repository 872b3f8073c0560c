//! Autoregressive text generation
//!
//! Runs the full model over the growing token sequence every step (no
//! key/value caching; quadratic cost accepted), scales the last-position
//! logits by temperature, truncates to the nucleus and draws the next
//! token, stopping at the end-of-sequence id or the step cap.

use anyhow::Result;
use burn::tensor::{Int, Tensor, TensorData, backend::Backend};
use log::{debug, info};

use crate::model::MoeGpt;
use crate::sampling::{XorShift64, extract_last_logits, sample_top_p};
use crate::tokenizer::TextTokenizer;

#[derive(Clone, Copy, Debug)]
pub struct GenerationOptions {
    /// Step cap: at most this many tokens are appended to the prompt.
    pub max_new_tokens: usize,
    /// Must be > 0; passing 0 or below is a caller error.
    pub temperature: f64,
    pub top_p: f64,
    pub seed: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: 0.7,
            top_p: 0.9,
            seed: 42,
        }
    }
}

pub struct TextGenerator<B: Backend> {
    model: MoeGpt<B>,
    tokenizer: TextTokenizer,
    device: B::Device,
}

impl<B: Backend> TextGenerator<B> {
    /// The model/tokenizer vocabulary contract is checked here; a
    /// mismatch is a construction-time error.
    pub fn new(model: MoeGpt<B>, tokenizer: TextTokenizer, device: B::Device) -> Result<Self> {
        anyhow::ensure!(
            model.vocab_size() == tokenizer.vocab_size(),
            "model vocab_size ({}) does not match tokenizer vocab size ({})",
            model.vocab_size(),
            tokenizer.vocab_size()
        );
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    pub fn model(&self) -> &MoeGpt<B> {
        &self.model
    }

    /// Generate a continuation of `prompt` and decode it with special
    /// tokens stripped. With `max_new_tokens == 0` this returns the
    /// decoded prompt unchanged.
    pub fn generate(&self, prompt: &str, opts: GenerationOptions) -> Result<String> {
        anyhow::ensure!(
            opts.temperature > 0.0,
            "temperature must be > 0, got {}",
            opts.temperature
        );
        anyhow::ensure!(
            opts.top_p > 0.0 && opts.top_p <= 1.0,
            "top_p must be in (0, 1], got {}",
            opts.top_p
        );

        let prompt_ids = self.tokenizer.encode(prompt)?;
        anyhow::ensure!(!prompt_ids.is_empty(), "prompt tokenized to zero tokens");

        let ids = self.generate_ids(&prompt_ids, opts);
        self.tokenizer.decode(&ids, true)
    }

    /// Token-level generation loop. Append-only: the returned sequence
    /// starts with the prompt and grows by one id per step until the eos
    /// id is emitted or the cap is reached.
    pub fn generate_ids(&self, prompt_ids: &[i64], opts: GenerationOptions) -> Vec<i64> {
        let eos_id = self.tokenizer.eos_id();
        let mut rng = XorShift64::new(opts.seed);
        let mut ids: Vec<i64> = prompt_ids.to_vec();

        info!(
            "Generation: prompt_len={}, max_new_tokens={}, temperature={}, top_p={}",
            ids.len(),
            opts.max_new_tokens,
            opts.temperature,
            opts.top_p
        );

        for step in 0..opts.max_new_tokens {
            let t = ids.len();
            let input = Tensor::<B, 1, Int>::from_data(
                TensorData::new(ids.clone(), [t]),
                &self.device,
            )
            .reshape([1, t]);

            // Full forward over the accumulated sequence
            let logits = self.model.forward(input, None);
            let last = extract_last_logits(logits);

            let next = sample_top_p(last, opts.temperature, opts.top_p, &mut rng);
            let next_id = next.to_data().to_vec::<i64>().unwrap()[0];
            ids.push(next_id);

            debug!("Generation step {}: token {}", step, next_id);

            if Some(next_id) == eos_id {
                info!("Generation stopped at eos after {} steps", step + 1);
                break;
            }
        }

        ids
    }
}
