//! Generation driver: loads the final checkpoint and prints transcripts
//! for a fixed prompt list.

use anyhow::{Context, Result};

use moegpt::backend::{AutoBackend, get_device, print_backend_info};
use moegpt::checkpoint::load_checkpoint;
use moegpt::generator::{GenerationOptions, TextGenerator};
use moegpt::tokenizer::TextTokenizer;

const PROMPTS: &[&str] = &[
    "The future of artificial intelligence is",
    "In a world where technology advances rapidly,",
    "The key to solving climate change is",
    "When exploring the depths of the ocean,",
    "The most important scientific discovery of the century was",
];

fn main() -> Result<()> {
    moegpt::init();
    print_backend_info();

    let device = get_device();
    let tokenizer =
        TextTokenizer::from_file("data/tokenizer.json").context("loading tokenizer")?;

    let (model, _config, state) =
        load_checkpoint::<AutoBackend>("checkpoints/final_model", None, &device)
            .context("loading final checkpoint")?;
    if let Some(state) = state {
        println!("Loaded checkpoint: step={}, loss={:.4}", state.step, state.loss);
    }

    let generator = TextGenerator::new(model, tokenizer, device)?;
    let opts = GenerationOptions::default();

    println!("\nGenerating outputs for different prompts:");
    println!("{}", "-".repeat(50));

    for (i, prompt) in PROMPTS.iter().enumerate() {
        println!("\nPrompt {}: {}", i + 1, prompt);
        println!("{}", "-".repeat(30));
        let text = generator.generate(prompt, opts)?;
        println!("Generated text: {}", text);
        println!("{}", "-".repeat(50));
    }

    Ok(())
}
