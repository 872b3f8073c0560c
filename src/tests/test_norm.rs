//! RMS normalization tests.

use burn::tensor::Tensor;

use crate::backend::AutoBackend;
use crate::norm::RmsNorm;

type TestBackend = AutoBackend;

#[test]
fn test_unit_gain_output_has_unit_rms() {
    let device = Default::default();
    let norm = RmsNorm::<TestBackend>::new(8, 1e-5, &device);

    let data: Vec<f32> = (0..2 * 3 * 8).map(|i| (i as f32 - 20.0) * 0.5).collect();
    let x = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device).reshape([2, 3, 8]);

    let y = norm.forward(x);

    // Freshly constructed gain is all ones, so every feature vector
    // should come out with RMS ~= 1.
    let rms: Vec<f32> = y
        .powf_scalar(2.0)
        .mean_dim(2)
        .sqrt()
        .to_data()
        .to_vec()
        .unwrap();
    for r in rms {
        assert!((r - 1.0).abs() < 1e-3, "expected unit RMS, got {}", r);
    }
}

#[test]
fn test_zero_input_stays_finite() {
    let device = Default::default();
    let norm = RmsNorm::<TestBackend>::new(4, 1e-5, &device);

    let x = Tensor::<TestBackend, 3>::zeros([1, 2, 4], &device);
    let y = norm.forward(x);

    let host: Vec<f32> = y.to_data().to_vec().unwrap();
    assert!(host.iter().all(|v| v.is_finite()));
}

#[test]
fn test_shape_preserved() {
    let device = Default::default();
    let norm = RmsNorm::<TestBackend>::new(6, 1e-5, &device);

    let x = Tensor::<TestBackend, 3>::ones([2, 5, 6], &device);
    assert_eq!(norm.forward(x).dims(), [2, 5, 6]);
}
