//! Checkpoint save/load
//!
//! A checkpoint directory holds `config.json`, `model.mpk`
//! (named-MessagePack record) and, for training checkpoints,
//! `state.json` with the step counter and last loss.
//!
//! Loading is a tiered fallback: a full checkpoint (config + weights +
//! train state), then config + weights without state, then a bare
//! `model.mpk` rebuilt from a caller-supplied config. Exhausting every
//! tier is a fatal load error, never a silent partial load.

use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::config::MoeGptConfig;
use crate::model::MoeGpt;

/// Training progress persisted next to the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainState {
    pub step: usize,
    pub loss: f64,
}

/// Save model, config and optional train state to a checkpoint directory.
pub fn save_checkpoint<B: Backend>(
    model: &MoeGpt<B>,
    config: &MoeGptConfig,
    state: Option<&TrainState>,
    checkpoint_dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = checkpoint_dir.as_ref();
    std::fs::create_dir_all(dir).context("Failed to create checkpoint directory")?;

    let config_path = dir.join("config.json");
    let config_file = File::create(&config_path)
        .with_context(|| format!("Failed to create config file: {:?}", config_path))?;
    serde_json::to_writer_pretty(BufWriter::new(config_file), config)
        .context("Failed to serialize config")?;

    if let Some(state) = state {
        let state_path = dir.join("state.json");
        let state_file = File::create(&state_path)
            .with_context(|| format!("Failed to create state file: {:?}", state_path))?;
        serde_json::to_writer_pretty(BufWriter::new(state_file), state)
            .context("Failed to serialize train state")?;
    }

    let record_path = dir.join("model.mpk");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(record_path, &recorder)
        .context("Failed to save model record")?;

    log::info!("Checkpoint saved to {:?}", dir);
    Ok(())
}

/// Load a checkpoint directory, trying each layout in turn:
/// 1. config.json + model.mpk + state.json
/// 2. config.json + model.mpk
/// 3. bare model.mpk, rebuilt from `fallback_config`
pub fn load_checkpoint<B: Backend>(
    checkpoint_dir: impl AsRef<Path>,
    fallback_config: Option<&MoeGptConfig>,
    device: &B::Device,
) -> Result<(MoeGpt<B>, MoeGptConfig, Option<TrainState>)> {
    let dir = checkpoint_dir.as_ref();
    let config_path = dir.join("config.json");

    let config: MoeGptConfig = if config_path.exists() {
        let config_file = File::open(&config_path)
            .with_context(|| format!("Failed to open config file: {:?}", config_path))?;
        serde_json::from_reader(BufReader::new(config_file))
            .context("Failed to deserialize config")?
    } else {
        fallback_config
            .cloned()
            .with_context(|| {
                format!(
                    "No config.json in {:?} and no fallback config supplied; \
                     cannot reconstruct the model",
                    dir
                )
            })?
    };

    let model = MoeGpt::<B>::new(&config, device);
    let model = load_weights(model, dir.join("model.mpk"), device)?;

    // Train state is optional in every tier
    let state_path = dir.join("state.json");
    let state: Option<TrainState> = if state_path.exists() {
        let state_file = File::open(&state_path)
            .with_context(|| format!("Failed to open state file: {:?}", state_path))?;
        Some(
            serde_json::from_reader(BufReader::new(state_file))
                .context("Failed to deserialize train state")?,
        )
    } else {
        None
    };

    log::info!("Checkpoint loaded from {:?}", dir);
    Ok((model, config, state))
}

/// Load weights into an existing model.
pub fn load_weights<B: Backend>(
    model: MoeGpt<B>,
    weights_path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<MoeGpt<B>> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = model
        .load_file(weights_path.as_ref(), &recorder, device)
        .with_context(|| format!("Failed to load model weights from {:?}", weights_path.as_ref()))?;
    Ok(model)
}
