use ndarray::{Array1, ArrayD, ArrayViewD, Axis};
use serde::{Serialize, Deserialize};

fn default_epsilon() -> f32 {
    1e-3
}

/// Batch normalization frozen at its moving statistics. Normalizes the
/// last (channel) axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub moving_mean: Array1<f32>,
    pub moving_variance: Array1<f32>,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
}

impl BatchNorm {
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        let channels = match input.last() {
            Some(&c) => c,
            None => return Err("batch normalization needs at least one axis".into()),
        };
        let lens = [
            self.gamma.len(),
            self.beta.len(),
            self.moving_mean.len(),
            self.moving_variance.len(),
        ];
        if lens.iter().any(|&l| l != channels) {
            return Err(format!("parameter lengths {:?} do not match {} channels", lens, channels));
        }
        Ok(input.to_vec())
    }

    /// Per-channel multiplier `gamma / sqrt(var + eps)`; this is also the
    /// layer's derivative.
    fn scale(&self) -> Array1<f32> {
        &self.gamma / &self.moving_variance.mapv(|v| (v + self.epsilon).sqrt())
    }

    pub fn normalize(&self, x: ArrayViewD<f32>) -> ArrayD<f32> {
        let scale = self.scale();
        let last = Axis(x.ndim() - 1);
        let mut y = x.to_owned();
        for mut lane in y.lanes_mut(last) {
            for (c, v) in lane.iter_mut().enumerate() {
                *v = (*v - self.moving_mean[c]) * scale[c] + self.beta[c];
            }
        }
        y
    }

    pub fn input_gradient(&self, upstream: ArrayViewD<f32>) -> ArrayD<f32> {
        let scale = self.scale();
        let last = Axis(upstream.ndim() - 1);
        let mut dx = upstream.to_owned();
        for mut lane in dx.lanes_mut(last) {
            for (c, g) in lane.iter_mut().enumerate() {
                *g *= scale[c];
            }
        }
        dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn normalizes_per_channel() {
        let bn = BatchNorm {
            gamma: array![2.0, 1.0],
            beta: array![0.0, 1.0],
            moving_mean: array![1.0, 0.0],
            moving_variance: array![1.0, 4.0],
            epsilon: 0.0,
        };
        let x = Array3::from_shape_vec((1, 1, 2), vec![3.0, 2.0]).unwrap().into_dyn();
        let y = bn.normalize(x.view());
        assert_eq!(y[[0, 0, 0]], 4.0);
        assert_eq!(y[[0, 0, 1]], 2.0);
        let g = bn.input_gradient(Array3::from_elem((1, 1, 2), 1.0).into_dyn().view());
        assert_eq!(g[[0, 0, 1]], 0.5);
    }
}
