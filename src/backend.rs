//! Backend selection
//!
//! One alias for inference, one wrapped in Autodiff for training. The
//! concrete backend is picked at compile time: ndarray on CPU by default,
//! wgpu when the `wgpu` feature is enabled.

use burn::tensor::backend::Backend;
use log::info;

#[cfg(feature = "wgpu")]
pub type AutoBackend = burn::backend::Wgpu;

#[cfg(not(feature = "wgpu"))]
pub type AutoBackend = burn::backend::NdArray;

/// Training backend: AutoBackend with gradient tracking.
pub type AutodiffAutoBackend = burn::backend::Autodiff<AutoBackend>;

pub fn get_device() -> <AutoBackend as Backend>::Device {
    Default::default()
}

pub fn print_backend_info() {
    #[cfg(feature = "wgpu")]
    info!("Backend: wgpu (GPU)");

    #[cfg(not(feature = "wgpu"))]
    info!("Backend: ndarray (CPU)");
}
