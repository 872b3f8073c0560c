//! Rotary position embeddings
//!
//! Precomputes a (position, head_dim/2) table of rotation angles
//! theta(pos, i) = pos * base^(-2i/D) and rotates query/key coordinate
//! pairs by (cos, sin) at each position. Rotation is an isometry, so
//! rotated vectors keep their norm.

use burn::module::Module;
use burn::tensor::{Tensor, TensorData, backend::Backend};
use log::debug;

#[derive(Module, Debug)]
pub struct RotaryEmbedding<B: Backend> {
    cos: Tensor<B, 2>, // [max_positions, head_dim/2]
    sin: Tensor<B, 2>,
    max_positions: usize,
    half_dim: usize,
}

impl<B: Backend> RotaryEmbedding<B> {
    /// Build the rotation table for positions `0..max_positions`.
    ///
    /// The table is immutable after construction; callers must size it to
    /// the longest sequence they will ever run.
    pub fn new(head_dim: usize, max_positions: usize, base: f32, device: &B::Device) -> Self {
        assert_eq!(
            head_dim % 2,
            0,
            "rotary head_dim must be even, got {}",
            head_dim
        );
        let half_dim = head_dim / 2;
        debug!(
            "RotaryEmbedding: head_dim={}, max_positions={}, base={}",
            head_dim, max_positions, base
        );

        let mut cos_host = Vec::with_capacity(max_positions * half_dim);
        let mut sin_host = Vec::with_capacity(max_positions * half_dim);
        for pos in 0..max_positions {
            for i in 0..half_dim {
                let freq = base.powf(-(2.0 * i as f32) / head_dim as f32);
                let angle = pos as f32 * freq;
                cos_host.push(angle.cos());
                sin_host.push(angle.sin());
            }
        }

        let cos = Tensor::from_data(TensorData::new(cos_host, [max_positions, half_dim]), device);
        let sin = Tensor::from_data(TensorData::new(sin_host, [max_positions, half_dim]), device);

        Self {
            cos,
            sin,
            max_positions,
            half_dim,
        }
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// Rotate queries and keys in place of absolute position vectors.
    ///
    /// `q`/`k` are [B, H, T, D]; the last dimension is split into D/2
    /// (x, y) pairs and each pair is rotated by its position angle:
    /// x' = x*cos - y*sin, y' = x*sin + y*cos. Output dtype and shape
    /// match the input. Pure function of the inputs and the table.
    pub fn apply(
        &self,
        q: Tensor<B, 4>,
        k: Tensor<B, 4>,
        seq_len: usize,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        assert!(
            seq_len <= self.max_positions,
            "sequence length {} exceeds precomputed rotary table ({} positions)",
            seq_len,
            self.max_positions
        );

        // [T, D/2] -> [1, 1, T, D/2] for broadcasting over batch and heads
        let cos = self
            .cos
            .clone()
            .slice([0..seq_len, 0..self.half_dim])
            .reshape([1, 1, seq_len, self.half_dim]);
        let sin = self
            .sin
            .clone()
            .slice([0..seq_len, 0..self.half_dim])
            .reshape([1, 1, seq_len, self.half_dim]);

        (
            self.rotate(q, &cos, &sin),
            self.rotate(k, &cos, &sin),
        )
    }

    fn rotate(
        &self,
        x: Tensor<B, 4>,
        cos: &Tensor<B, 4>,
        sin: &Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [b, h, t, d] = x.dims();
        let half = self.half_dim;
        debug_assert_eq!(d, half * 2);

        // Split interleaved (x, y) pairs
        let pairs = x.reshape([b, h, t, half, 2]);
        let xr = pairs
            .clone()
            .slice([0..b, 0..h, 0..t, 0..half, 0..1])
            .reshape([b, h, t, half]);
        let xi = pairs
            .slice([0..b, 0..h, 0..t, 0..half, 1..2])
            .reshape([b, h, t, half]);

        let out_r = xr.clone() * cos.clone() - xi.clone() * sin.clone();
        let out_i = xr * sin.clone() + xi * cos.clone();

        // Interleave back to [B, H, T, D]
        Tensor::stack::<5>(vec![out_r, out_i], 4).reshape([b, h, t, d])
    }
}
