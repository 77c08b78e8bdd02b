use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use std::f32::consts::PI;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    // Both draws in (0, 1] to avoid log(0).
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = 1.0 - rng.gen::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn normal<R: Rng + ?Sized>(rng: &mut R, shape: &[usize], std_dev: f32) -> ArrayD<f32> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || sample_standard_normal(rng) * std_dev)
}

/// He initialization: N(0, sqrt(2 / fan_in)).
///
/// Recommended before ReLU layers. The variance 2/fan_in accounts for
/// the fact that ReLU zeroes half of its inputs on average.
pub fn he<R: Rng + ?Sized>(rng: &mut R, shape: &[usize], fan_in: usize) -> ArrayD<f32> {
    normal(rng, shape, (2.0 / fan_in.max(1) as f32).sqrt())
}

/// Xavier (Glorot) initialization: N(0, sqrt(1 / fan_in)).
///
/// Recommended before Sigmoid/Tanh/Identity/Softmax layers.
pub fn xavier<R: Rng + ?Sized>(rng: &mut R, shape: &[usize], fan_in: usize) -> ArrayD<f32> {
    normal(rng, shape, (1.0 / fan_in.max(1) as f32).sqrt())
}
