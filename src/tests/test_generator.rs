//! End-to-end generation tests on a tiny randomly-initialized model.

use crate::backend::{AutoBackend, get_device};
use crate::config::MoeGptConfig;
use crate::generator::{GenerationOptions, TextGenerator};
use crate::model::MoeGpt;
use crate::tests::test_tokenizer::word_tokenizer;
use crate::tokenizer::TextTokenizer;

type B = AutoBackend;

fn tiny_setup() -> (TextGenerator<B>, TextTokenizer) {
    let tokenizer = word_tokenizer(&["hello", "world", "rust", "moe"]);
    let tokenizer_for_ids = word_tokenizer(&["hello", "world", "rust", "moe"]);
    let device = get_device();

    let config = MoeGptConfig {
        vocab_size: tokenizer.vocab_size(),
        n_embd: 16,
        n_layer: 1,
        n_head: 2,
        n_expert: 2,
        top_k: 1,
        sequence_len: 64,
        ..Default::default()
    };

    let model = MoeGpt::<B>::new(&config, &device);
    let generator = TextGenerator::new(model, tokenizer, device).unwrap();
    (generator, tokenizer_for_ids)
}

fn quick_opts(max_new_tokens: usize) -> GenerationOptions {
    GenerationOptions {
        max_new_tokens,
        temperature: 1.0,
        top_p: 0.9,
        seed: 7,
    }
}

#[test]
fn test_zero_new_tokens_returns_prompt() {
    let (generator, _) = tiny_setup();
    let out = generator.generate("hello world", quick_opts(0)).unwrap();
    assert_eq!(out, "hello world");
}

#[test]
fn test_generation_preserves_prompt_prefix() {
    let (generator, tokenizer) = tiny_setup();
    let prompt_ids = tokenizer.encode("hello world rust").unwrap();

    let ids = generator.generate_ids(&prompt_ids, quick_opts(5));

    assert!(ids.len() >= prompt_ids.len());
    assert!(ids.len() <= prompt_ids.len() + 5);
    assert_eq!(&ids[..prompt_ids.len()], prompt_ids.as_slice());
}

#[test]
fn test_generated_ids_in_vocab_range() {
    let (generator, tokenizer) = tiny_setup();
    let vocab = tokenizer.vocab_size() as i64;
    let prompt_ids = tokenizer.encode("hello").unwrap();

    let ids = generator.generate_ids(&prompt_ids, quick_opts(8));
    for &id in &ids {
        assert!(id >= 0 && id < vocab, "id {} out of range", id);
    }
}

#[test]
fn test_same_seed_same_output() {
    let (generator, tokenizer) = tiny_setup();
    let prompt_ids = tokenizer.encode("hello world").unwrap();

    let a = generator.generate_ids(&prompt_ids, quick_opts(6));
    let b = generator.generate_ids(&prompt_ids, quick_opts(6));
    assert_eq!(a, b);
}

#[test]
fn test_generate_rejects_bad_temperature() {
    let (generator, _) = tiny_setup();
    let opts = GenerationOptions {
        temperature: 0.0,
        ..quick_opts(4)
    };
    assert!(generator.generate("hello", opts).is_err());
}

#[test]
fn test_generate_rejects_bad_top_p() {
    let (generator, _) = tiny_setup();
    let opts = GenerationOptions {
        top_p: 1.5,
        ..quick_opts(4)
    };
    assert!(generator.generate("hello", opts).is_err());
}

#[test]
fn test_vocab_mismatch_is_construction_error() {
    let tokenizer = word_tokenizer(&["hello", "world"]);
    let device = get_device();

    let config = MoeGptConfig {
        vocab_size: tokenizer.vocab_size() + 3,
        n_embd: 16,
        n_layer: 1,
        n_head: 2,
        n_expert: 2,
        top_k: 1,
        sequence_len: 64,
        ..Default::default()
    };
    let model = MoeGpt::<B>::new(&config, &device);

    assert!(TextGenerator::new(model, tokenizer, device).is_err());
}
