//! Fixed-step pretraining loop
//!
//! Streams text batches, tokenizes and pads them, runs forward/backward
//! with gradient accumulation, steps AdamW with norm clipping, and writes
//! periodic checkpoints plus a final one with the config. Control flow is
//! strictly sequential; a framework error during a step aborts the run.

use anyhow::{Context, Result};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::Module;
use burn::optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Bool, ElementConversion, Int, Tensor, TensorData};
use log::info;
use std::path::PathBuf;

use crate::checkpoint::{TrainState, save_checkpoint};
use crate::config::MoeGptConfig;
use crate::dataset::TextStream;
use crate::model::MoeGpt;
use crate::tokenizer::TextTokenizer;

#[derive(Clone, Debug)]
pub struct TrainOptions {
    pub num_steps: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub grad_accum_steps: usize,
    pub max_seq_len: usize,
    pub checkpoint_every: usize,
    pub checkpoint_dir: PathBuf,
    pub log_every: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            num_steps: 10100,
            batch_size: 4,
            learning_rate: 1e-4,
            grad_accum_steps: 4,
            max_seq_len: 512,
            checkpoint_every: 500,
            checkpoint_dir: PathBuf::from("checkpoints"),
            log_every: 10,
        }
    }
}

/// Run the training loop and return the trained model.
pub fn train<B: AutodiffBackend>(
    config: &MoeGptConfig,
    opts: &TrainOptions,
    tokenizer: &TextTokenizer,
    stream: &mut TextStream,
    device: &B::Device,
) -> Result<MoeGpt<B>> {
    anyhow::ensure!(
        config.vocab_size == tokenizer.vocab_size(),
        "model vocab_size ({}) does not match tokenizer vocab size ({})",
        config.vocab_size,
        tokenizer.vocab_size()
    );
    anyhow::ensure!(opts.grad_accum_steps >= 1, "grad_accum_steps must be >= 1");
    anyhow::ensure!(opts.batch_size >= 1, "batch_size must be >= 1");

    let mut model = MoeGpt::<B>::new(config, device);
    info!(
        "Model ready: {} layers, {} parameters, effective batch size {}",
        model.num_layers(),
        model.num_params(),
        opts.batch_size * opts.grad_accum_steps
    );

    let mut optim = AdamWConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.95)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(1.0)))
        .init::<B, MoeGpt<B>>();
    let mut accumulator: GradientsAccumulator<MoeGpt<B>> = GradientsAccumulator::new();

    let mut total_loss = 0.0f64;
    let mut last_loss = f64::NAN;
    let mut last_log = std::time::Instant::now();

    info!("Starting training for {} steps", opts.num_steps);

    for step in 1..=opts.num_steps {
        let texts = stream
            .next_batch(opts.batch_size)
            .context("streaming training batch")?;
        let (ids, mask) = batch_to_tensors::<B>(tokenizer, &texts, opts.max_seq_len, device)?;

        // Causal LM: labels are the inputs, shifted inside forward_loss
        let labels = ids.clone();
        let loss = model.forward_loss(ids, labels, Some(mask));
        last_loss = loss.clone().into_scalar().elem::<f64>();
        total_loss += last_loss;

        let scaled = loss / opts.grad_accum_steps as f32;
        let grads = GradientsParams::from_grads(scaled.backward(), &model);
        accumulator.accumulate(&model, grads);

        if step % opts.grad_accum_steps == 0 {
            let grads = accumulator.grads();
            model = optim.step(opts.learning_rate, model, grads);
        }

        if opts.log_every > 0 && step % opts.log_every == 0 {
            let elapsed = last_log.elapsed().as_secs_f64();
            last_log = std::time::Instant::now();
            info!(
                "step {}/{} | loss {:.4} | avg loss {:.4} | {:.2}s since last log",
                step,
                opts.num_steps,
                last_loss,
                total_loss / step as f64,
                elapsed
            );
        }

        if opts.checkpoint_every > 0 && step % opts.checkpoint_every == 0 {
            let dir = opts.checkpoint_dir.join(format!("checkpoint_{}", step));
            let state = TrainState {
                step,
                loss: last_loss,
            };
            save_checkpoint(&model, config, Some(&state), &dir)
                .with_context(|| format!("saving checkpoint at step {}", step))?;
        }
    }

    let final_dir = opts.checkpoint_dir.join("final_model");
    let state = TrainState {
        step: opts.num_steps,
        loss: last_loss,
    };
    save_checkpoint(&model, config, Some(&state), &final_dir)
        .context("saving final checkpoint")?;

    info!("Training completed");
    Ok(model)
}

/// Tokenize, truncate and pad a batch of texts into id and validity-mask
/// tensors.
fn batch_to_tensors<B: AutodiffBackend>(
    tokenizer: &TextTokenizer,
    texts: &[String],
    max_seq_len: usize,
    device: &B::Device,
) -> Result<(Tensor<B, 2, Int>, Tensor<B, 2, Bool>)> {
    let (rows, masks) = tokenizer.encode_batch_padded(texts, max_seq_len)?;
    let b = rows.len();
    let t = rows[0].len();

    let flat_ids: Vec<i64> = rows.into_iter().flatten().collect();
    let flat_mask: Vec<bool> = masks.into_iter().flatten().collect();

    let ids = Tensor::from_data(TensorData::new(flat_ids, [b, t]), device);
    let mask = Tensor::from_data(TensorData::new(flat_mask, [b, t]), device);
    Ok((ids, mask))
}
