use ndarray::{Array1, Array2, ArrayView1};
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;

/// Fully-connected layer: `z = x · W + b`, then the activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Shape `(input_size, size)`.
    pub weights: Array2<f32>,
    /// Shape `(size,)`.
    pub bias: Array1<f32>,
    #[serde(default)]
    pub activation: ActivationFunction,
}

impl Dense {
    pub fn size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        let (rows, cols) = self.weights.dim();
        if input.len() != 1 {
            return Err(format!("expected a flat input, got {:?}; add a flatten or pooling layer", input));
        }
        if input[0] != rows {
            return Err(format!("weights expect {} inputs, got {}", rows, input[0]));
        }
        if self.bias.len() != cols {
            return Err(format!("bias has {} entries for {} units", self.bias.len(), cols));
        }
        Ok(vec![cols])
    }

    pub fn linear(&self, x: ArrayView1<f32>) -> Array1<f32> {
        x.dot(&self.weights) + &self.bias
    }

    /// Propagates ∂s/∂z back through the weights: ∂s/∂x = W · ∂s/∂z.
    pub fn input_gradient(&self, dz: ArrayView1<f32>) -> Array1<f32> {
        self.weights.dot(&dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn linear_then_gradient() {
        let dense = Dense {
            weights: array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            bias: array![0.5, -0.5],
            activation: ActivationFunction::Identity,
        };
        let z = dense.linear(array![1.0, 0.0, 1.0].view());
        assert_eq!(z, array![6.5, 7.5]);
        let dx = dense.input_gradient(array![1.0, 0.0].view());
        assert_eq!(dx, array![1.0, 3.0, 5.0]);
        assert_eq!(dense.output_shape(&[3]).unwrap(), vec![2]);
        assert!(dense.output_shape(&[4]).is_err());
    }
}
