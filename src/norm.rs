//! RMS normalization with a learned per-feature gain, no bias.

use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::tensor::{Tensor, backend::Backend};

#[derive(Module, Debug)]
pub struct RmsNorm<B: Backend> {
    gain: Param<Tensor<B, 1>>,
    eps: f32,
}

impl<B: Backend> RmsNorm<B> {
    pub fn new(d_model: usize, eps: f32, device: &B::Device) -> Self {
        Self {
            gain: Initializer::Ones.init([d_model], device),
            eps,
        }
    }

    /// Scale `x` by the inverse root-mean-square of its feature axis,
    /// then by the learned gain. `eps` keeps all-zero inputs finite.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [b, t, d] = x.dims();

        // mean of squares over the feature axis (kept dim)
        let ms = x.clone().powf_scalar(2.0).mean_dim(2);
        let rms = (ms + self.eps).sqrt();
        let x = x / rms.expand([b, t, d]);

        x * self.gain.val().reshape([1, 1, d])
    }
}
