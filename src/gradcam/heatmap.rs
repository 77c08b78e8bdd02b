use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::{ExplainError, Result};

/// Low-resolution importance map over the feature-map grid, values in
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    values: Array2<f32>,
}

impl Heatmap {
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// `(height, width)` of the feature-map grid.
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    pub fn is_all_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }
}

/// Builds the class activation map `Σ_c w[c] · A[:, :, c]`, clips negative
/// evidence to zero and scales by the maximum.
///
/// When every clipped value is zero the map is returned as-is (all zeros).
pub fn synthesize(activation: &Array3<f32>, channel_weights: &Array1<f32>) -> Result<Heatmap> {
    let (h, w, channels) = activation.dim();
    if channel_weights.len() != channels {
        return Err(ExplainError::Configuration(format!(
            "{} channel weights for an activation with {} channels",
            channel_weights.len(),
            channels
        )));
    }

    let mut values = Array2::<f32>::zeros((h, w));
    for (c, &weight) in channel_weights.iter().enumerate() {
        values.scaled_add(weight, &activation.index_axis(Axis(2), c));
    }

    values.mapv_inplace(|v| v.max(0.0));

    let max = values.iter().copied().fold(0.0_f32, f32::max);
    if max > 0.0 {
        values.mapv_inplace(|v| v / max);
    }
    Ok(Heatmap { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn weighted_sum_then_normalize() {
        // 1x2 grid, 2 channels
        let a = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 0.0]).unwrap();
        let heat = synthesize(&a, &array![1.0, 0.5]).unwrap();
        // raw: [1 + 1, 3 + 0] = [2, 3]
        assert!((heat.values()[[0, 0]] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(heat.values()[[0, 1]], 1.0);
    }

    #[test]
    fn all_negative_evidence_yields_exact_zeros() {
        let a = Array3::from_elem((7, 7, 4), -0.5);
        let heat = synthesize(&a, &array![1.0, 2.0, 0.1, 3.0]).unwrap();
        assert!(heat.is_all_zero());
        assert!(heat.values().iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn negative_regions_are_clipped() {
        let a = Array3::from_shape_vec((1, 3, 1), vec![-2.0, 0.0, 4.0]).unwrap();
        let heat = synthesize(&a, &array![1.0]).unwrap();
        assert_eq!(heat.values(), &array![[0.0, 0.0, 1.0]]);
    }

    #[test]
    fn values_stay_in_unit_interval() {
        let a = Array3::from_shape_fn((5, 5, 3), |(h, w, c)| (h as f32 - 2.0) * (w as f32 + 1.0) - c as f32);
        let heat = synthesize(&a, &array![0.3, -0.2, 0.9]).unwrap();
        assert!(heat.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(heat.max(), 1.0);
    }

    #[test]
    fn weight_count_must_match_channels() {
        let a = Array3::zeros((2, 2, 3));
        assert!(synthesize(&a, &array![1.0, 1.0]).is_err());
    }
}
