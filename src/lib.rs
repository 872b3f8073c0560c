//! MoeGPT - a small mixture-of-experts causal language model in Burn
//!
//! Decoder-only transformer with rotary position embeddings, top-k expert
//! routing with a load-balancing auxiliary loss, nucleus-sampling text
//! generation and a fixed-step pretraining loop.

pub mod attention;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod generator;
pub mod model;
pub mod moe;
pub mod norm;
pub mod rope;
pub mod sampling;
pub mod tokenizer;
pub mod trainer;

pub use checkpoint::{load_checkpoint, load_weights, save_checkpoint};

#[cfg(test)]
mod tests;

pub use backend::{AutoBackend, AutodiffAutoBackend, get_device, print_backend_info};
pub use config::MoeGptConfig;

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        // Read RUST_LOG env variable, default to "info" if not set
        let env = env_logger::Env::default().default_filter_or("info");

        // don't panic if called multiple times across binaries
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        backend::{AutoBackend, AutodiffAutoBackend, get_device},
        config::MoeGptConfig,
        generator::{GenerationOptions, TextGenerator},
        model::MoeGpt,
    };
}
