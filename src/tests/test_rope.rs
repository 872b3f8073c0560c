//! Rotary embedding tests: rotation geometry and table bounds.

use burn::tensor::Tensor;

use crate::backend::AutoBackend;
use crate::rope::RotaryEmbedding;

type TestBackend = AutoBackend;

fn test_qk(b: usize, h: usize, t: usize, d: usize) -> (Tensor<TestBackend, 4>, Tensor<TestBackend, 4>) {
    let n = b * h * t * d;
    let q_data: Vec<f32> = (0..n).map(|i| ((i * 7 + 3) % 13) as f32 - 6.0).collect();
    let k_data: Vec<f32> = (0..n).map(|i| ((i * 11 + 5) % 17) as f32 - 8.0).collect();
    let device = Default::default();
    let q = Tensor::<TestBackend, 1>::from_floats(q_data.as_slice(), &device).reshape([b, h, t, d]);
    let k = Tensor::<TestBackend, 1>::from_floats(k_data.as_slice(), &device).reshape([b, h, t, d]);
    (q, k)
}

#[test]
fn test_output_shape_matches_input() {
    let device = Default::default();
    let rope = RotaryEmbedding::<TestBackend>::new(8, 16, 10000.0, &device);
    let (q, k) = test_qk(2, 2, 5, 8);

    let (q_rot, k_rot) = rope.apply(q, k, 5);
    assert_eq!(q_rot.dims(), [2, 2, 5, 8]);
    assert_eq!(k_rot.dims(), [2, 2, 5, 8]);
}

#[test]
fn test_rotation_is_isometry() {
    // Each (x, y) coordinate pair is rotated by a plain 2D rotation, so
    // the norm of every head vector is preserved.
    let device = Default::default();
    let rope = RotaryEmbedding::<TestBackend>::new(8, 16, 10000.0, &device);
    let (q, k) = test_qk(2, 2, 6, 8);

    let (q_rot, k_rot) = rope.apply(q.clone(), k.clone(), 6);

    for (before, after) in [(q, q_rot), (k, k_rot)] {
        let norm_before: Vec<f32> = before
            .powf_scalar(2.0)
            .sum_dim(3)
            .sqrt()
            .to_data()
            .to_vec()
            .unwrap();
        let norm_after: Vec<f32> = after
            .powf_scalar(2.0)
            .sum_dim(3)
            .sqrt()
            .to_data()
            .to_vec()
            .unwrap();
        for (nb, na) in norm_before.iter().zip(norm_after.iter()) {
            assert!(
                (nb - na).abs() < 1e-3,
                "norm changed under rotation: {} -> {}",
                nb,
                na
            );
        }
    }
}

#[test]
fn test_pairwise_norms_preserved() {
    let device = Default::default();
    let rope = RotaryEmbedding::<TestBackend>::new(4, 8, 10000.0, &device);
    let (q, k) = test_qk(1, 1, 4, 4);

    let (q_rot, _) = rope.apply(q.clone(), k, 4);

    let before: Vec<f32> = q.to_data().to_vec().unwrap();
    let after: Vec<f32> = q_rot.to_data().to_vec().unwrap();

    // Interleaved pairs: (0,1), (2,3), ...
    for pair in 0..before.len() / 2 {
        let nb = before[2 * pair].powi(2) + before[2 * pair + 1].powi(2);
        let na = after[2 * pair].powi(2) + after[2 * pair + 1].powi(2);
        assert!((nb - na).abs() < 1e-3);
    }
}

#[test]
fn test_position_zero_is_identity() {
    // At position 0 every angle is 0, so the first timestep is untouched.
    let device = Default::default();
    let rope = RotaryEmbedding::<TestBackend>::new(8, 4, 10000.0, &device);
    let (q, k) = test_qk(1, 1, 1, 8);

    let (q_rot, _) = rope.apply(q.clone(), k, 1);

    let before: Vec<f32> = q.to_data().to_vec().unwrap();
    let after: Vec<f32> = q_rot.to_data().to_vec().unwrap();
    for (b, a) in before.iter().zip(after.iter()) {
        assert!((b - a).abs() < 1e-6);
    }
}

#[test]
#[should_panic(expected = "exceeds precomputed rotary table")]
fn test_sequence_longer_than_table_panics() {
    let device = Default::default();
    let rope = RotaryEmbedding::<TestBackend>::new(4, 4, 10000.0, &device);
    let (q, k) = test_qk(1, 1, 8, 4);
    let _ = rope.apply(q, k, 8);
}

#[test]
#[should_panic(expected = "must be even")]
fn test_odd_head_dim_panics() {
    let device = Default::default();
    let _ = RotaryEmbedding::<TestBackend>::new(5, 4, 10000.0, &device);
}
