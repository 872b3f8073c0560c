//! Sampling primitives for text generation
//!
//! Temperature scaling, nucleus (top-p) truncation and a categorical draw
//! over the renormalized remainder. Logits come in as [B, V]; sampled ids
//! go out as [B, 1] Int tensors.

use burn::tensor::{Bool, Int, Tensor, TensorData, activation, backend::Backend};
use log::debug;

#[derive(Clone, Copy)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // Avoid the all-zero state.
        let s = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: s }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        // Use top 24 bits -> [0,1)
        let v = (self.next_u64() >> 40) as u32; // 24 bits
        (v as f32) * (1.0 / (1u32 << 24) as f32)
    }
}

#[inline]
fn sample_multinomial_row(probs: &[f32], rng: &mut XorShift64) -> usize {
    let r = rng.next_f32();
    let mut cum = 0.0f32;

    for (i, &p) in probs.iter().enumerate() {
        cum += p;
        if r <= cum {
            return i;
        }
    }
    // Numerical fallback
    probs.len().saturating_sub(1)
}

/// Categorical draw per batch row. Input [B, V] probabilities, output [B, 1].
pub fn sample_from_probs<B: Backend>(
    probs: Tensor<B, 2>,
    rng: &mut XorShift64,
) -> Tensor<B, 2, Int> {
    let [b, v] = probs.dims();
    let host: Vec<f32> = probs.to_data().to_vec().unwrap();

    let mut out: Vec<i64> = Vec::with_capacity(b);
    for bi in 0..b {
        let row = &host[bi * v..(bi + 1) * v];
        out.push(sample_multinomial_row(row, rng) as i64);
    }

    Tensor::<B, 1, Int>::from_data(TensorData::new(out, [b]), &probs.device()).reshape([b, 1])
}

// ═════════════════════════════════════════════════════════════════════════════
// Temperature scaling
// ═════════════════════════════════════════════════════════════════════════════

pub fn apply_temperature<B: Backend>(logits: Tensor<B, 2>, temperature: f64) -> Tensor<B, 2> {
    if temperature == 1.0 {
        return logits;
    }
    assert!(
        temperature > 0.0,
        "Temperature must be positive, got {}",
        temperature
    );
    debug!("Applying temperature scaling: {}", temperature);
    logits / temperature
}

// ═════════════════════════════════════════════════════════════════════════════
// Top-p (nucleus) filtering
// ═════════════════════════════════════════════════════════════════════════════

/// Keep, per row, the smallest descending-probability prefix whose
/// cumulative mass exceeds `p`; the highest-probability token is always
/// kept. Removed tokens get -inf logits.
pub fn top_p_filter<B: Backend>(logits: Tensor<B, 2>, p: f64) -> Tensor<B, 2> {
    assert!(p > 0.0 && p <= 1.0, "top_p must be in (0, 1]");
    let [batch, vocab] = logits.dims();

    if p >= 0.9999 {
        return logits;
    }

    debug!("Applying top-p filter: p={}", p);

    let probs = activation::softmax(logits.clone(), 1);
    let probs_host: Vec<f32> = probs.to_data().to_vec().unwrap();

    let mut keep_mask_bool: Vec<bool> = vec![false; batch * vocab];

    for b in 0..batch {
        let mut pairs: Vec<(f32, usize)> =
            (0..vocab).map(|v| (probs_host[b * vocab + v], v)).collect();
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        // The first sorted entry is kept unconditionally (cum starts at 0),
        // then tokens enter while the cumulative mass so far is below p.
        let mut cum = 0.0f32;
        for (prob, idx) in pairs {
            if cum < p as f32 {
                keep_mask_bool[b * vocab + idx] = true;
                cum += prob;
            } else {
                break;
            }
        }
    }

    let keep_mask_data = TensorData::new(keep_mask_bool, [batch, vocab]);
    let keep_bool = Tensor::<B, 2, Bool>::from_data(keep_mask_data, &probs.device());

    logits.mask_fill(keep_bool.bool_not(), f64::NEG_INFINITY)
}

// ═════════════════════════════════════════════════════════════════════════════
// Sampling entry points
// ═════════════════════════════════════════════════════════════════════════════

/// Greedy sampling: argmax on vocab dimension. Input [B, V], output [B, 1].
pub fn sample_greedy<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 2, Int> {
    logits.argmax(1)
}

/// Temperature + nucleus sampling over last-position logits.
/// Input [B, V], output [B, 1].
pub fn sample_top_p<B: Backend>(
    logits: Tensor<B, 2>,
    temperature: f64,
    top_p: f64,
    rng: &mut XorShift64,
) -> Tensor<B, 2, Int> {
    let logits = apply_temperature(logits, temperature);
    let logits = top_p_filter(logits, top_p);
    let probs = activation::softmax(logits, 1);
    sample_from_probs(probs, rng)
}

/// Extract last timestep logits from [B, T, V] -> [B, V]
pub fn extract_last_logits<B: Backend>(logits: Tensor<B, 3>) -> Tensor<B, 2> {
    let [b, t, v] = logits.dims();
    logits.slice([0..b, (t - 1)..t, 0..v]).reshape([b, v])
}
