//! Pretraining driver: fixed paths and hyperparameters, no flags.

use anyhow::{Context, Result};

use moegpt::backend::{AutodiffAutoBackend, get_device, print_backend_info};
use moegpt::config::MoeGptConfig;
use moegpt::dataset::TextStream;
use moegpt::tokenizer::TextTokenizer;
use moegpt::trainer::{TrainOptions, train};

fn main() -> Result<()> {
    moegpt::init();
    print_backend_info();

    let device = get_device();
    let tokenizer =
        TextTokenizer::from_file("data/tokenizer.json").context("loading tokenizer")?;
    let mut stream = TextStream::open("data/corpus.txt").context("opening training corpus")?;

    let config = MoeGptConfig {
        vocab_size: tokenizer.vocab_size(),
        ..MoeGptConfig::default()
    };
    let opts = TrainOptions::default();

    println!("Training MoeGPT for {} steps", opts.num_steps);
    println!(
        "  vocab={} n_embd={} n_layer={} n_expert={} top_k={}",
        config.vocab_size, config.n_embd, config.n_layer, config.n_expert, config.top_k
    );

    let _model = train::<AutodiffAutoBackend>(&config, &opts, &tokenizer, &mut stream, &device)?;

    println!("Training completed!");
    Ok(())
}
