use ndarray::{Array1, Array3, Axis};
use tracing::{debug, warn};

use crate::classifier::{Classifier, ImageBatch};
use crate::error::{ExplainError, Result};
use crate::layers::pool::global_average_pool;
use crate::math::argmax;

/// Everything the heatmap synthesizer needs from one recorded pass.
#[derive(Debug, Clone)]
pub struct ChannelWeights {
    /// Watched layer output, `(H', W', C)`.
    pub activation: Array3<f32>,
    /// One weight per channel.
    pub weights: Array1<f32>,
    /// Class the explanation is anchored to.
    pub class_index: usize,
    /// Scores from the same pass that produced `activation`.
    pub scores: Vec<f32>,
    /// True when the mean-absolute-activation pseudo-gradient stood in for
    /// a missing gradient.
    pub used_fallback: bool,
}

/// Per-channel mean of `|A|`, broadcast over every spatial position.
fn pseudo_gradient(activation: &Array3<f32>) -> Array3<f32> {
    let magnitude = global_average_pool(activation.mapv(f32::abs).view());
    let mut grad = Array3::zeros(activation.raw_dim());
    for (c, mut plane) in grad.axis_iter_mut(Axis(2)).enumerate() {
        plane.fill(magnitude[c]);
    }
    grad
}

/// Runs one differentiable pass through `classifier`, differentiates the
/// target class score with respect to `layer_name`'s output and pools the
/// gradient into channel weights.
///
/// Without an explicit `target`, the predicted (arg-max) class is used. A
/// missing gradient is replaced by [`pseudo_gradient`]; this never fails.
pub fn compute_channel_weights(
    classifier: &dyn Classifier,
    layer_name: &str,
    batch: &ImageBatch,
    target: Option<usize>,
) -> Result<ChannelWeights> {
    let tape = classifier.get_layer_output(layer_name, batch)?;
    let scores = tape.scores().to_vec();

    let class_index = match target {
        Some(index) if index < scores.len() => index,
        Some(index) => {
            return Err(ExplainError::InvalidInput(format!(
                "target class {} out of range for {} classes",
                index,
                scores.len()
            )))
        }
        None => argmax(&scores)
            .ok_or_else(|| ExplainError::Configuration("model produced no scores".into()))?,
    };

    let activation = tape.activation().clone();
    let (grad, used_fallback) = match tape.gradient(class_index)? {
        Some(grad) => {
            if grad.dim() != activation.dim() {
                return Err(ExplainError::Configuration(format!(
                    "gradient shape {:?} does not match activation shape {:?}",
                    grad.dim(),
                    activation.dim()
                )));
            }
            (grad, false)
        }
        None => {
            warn!(layer = layer_name, class_index, "no gradient path; using mean |activation| pseudo-gradient");
            (pseudo_gradient(&activation), true)
        }
    };

    let weights = global_average_pool(grad.view());
    debug!(
        layer = layer_name,
        class_index,
        channels = weights.len(),
        shape = ?activation.dim(),
        "pooled channel weights"
    );

    Ok(ChannelWeights { activation, weights, class_index, scores, used_fallback })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::GradientTape;
    use crate::gradcam::heatmap::synthesize;
    use crate::layers::{LayerInfo, LayerKind};
    use ndarray::{array, Array4};

    /// Classifier stub with fixed scores and activation; `gradient` is
    /// returned verbatim from the tape.
    struct Stub {
        scores: Vec<f32>,
        activation: Array3<f32>,
        gradient: Option<Array3<f32>>,
    }

    struct StubTape<'a>(&'a Stub);

    impl GradientTape for StubTape<'_> {
        fn activation(&self) -> &Array3<f32> {
            &self.0.activation
        }
        fn scores(&self) -> &[f32] {
            &self.0.scores
        }
        fn gradient(&self, _class_index: usize) -> Result<Option<Array3<f32>>> {
            Ok(self.0.gradient.clone())
        }
    }

    impl Classifier for Stub {
        fn input_shape(&self) -> Vec<usize> {
            vec![2, 2, 3]
        }
        fn labels(&self) -> Vec<String> {
            vec!["Normal".into(), "Diseased".into()]
        }
        fn layers(&self) -> Result<Vec<LayerInfo>> {
            Ok(vec![LayerInfo { name: "conv".into(), kind: LayerKind::Conv2d, output_shape: vec![2, 2, 2] }])
        }
        fn forward(&self, _batch: &ImageBatch) -> Result<Vec<f32>> {
            Ok(self.scores.clone())
        }
        fn get_layer_output<'a>(&'a self, _layer_name: &str, _batch: &ImageBatch) -> Result<Box<dyn GradientTape + 'a>> {
            Ok(Box::new(StubTape(self)))
        }
    }

    fn batch() -> ImageBatch {
        ImageBatch::new(Array4::from_elem((1, 2, 2, 3), 0.5)).unwrap()
    }

    fn activation() -> Array3<f32> {
        Array3::from_shape_vec((2, 2, 2), vec![1.0, -2.0, 3.0, 0.0, 0.0, 4.0, 2.0, 2.0]).unwrap()
    }

    #[test]
    fn pools_gradient_over_spatial_axes() {
        let stub = Stub {
            scores: vec![0.1, 0.9],
            activation: activation(),
            gradient: Some(Array3::from_shape_vec((2, 2, 2), vec![1.0, 0.0, 3.0, 0.0, 0.0, 4.0, 0.0, 0.0]).unwrap()),
        };
        let cw = compute_channel_weights(&stub, "conv", &batch(), None).unwrap();
        assert_eq!(cw.class_index, 1);
        assert_eq!(cw.weights, array![1.0, 1.0]);
        assert!(!cw.used_fallback);
    }

    #[test]
    fn missing_gradient_falls_back_to_mean_abs_activation() {
        let stub = Stub { scores: vec![0.7, 0.3], activation: activation(), gradient: None };
        let cw = compute_channel_weights(&stub, "conv", &batch(), None).unwrap();
        assert!(cw.used_fallback);
        assert_eq!(cw.class_index, 0);
        // channel 0: |1|,|3|,|0|,|2| → 1.5; channel 1: |-2|,|0|,|4|,|2| → 2.0
        assert_eq!(cw.weights, array![1.5, 2.0]);

        let heat = synthesize(&cw.activation, &cw.weights).unwrap();
        assert!(!heat.is_all_zero());
        assert_eq!(heat.max(), 1.0);
    }

    #[test]
    fn explicit_target_overrides_argmax() {
        let stub = Stub { scores: vec![0.1, 0.9], activation: activation(), gradient: None };
        let cw = compute_channel_weights(&stub, "conv", &batch(), Some(0)).unwrap();
        assert_eq!(cw.class_index, 0);
        let err = compute_channel_weights(&stub, "conv", &batch(), Some(2)).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn mismatched_gradient_shape_is_rejected() {
        let stub = Stub {
            scores: vec![0.1, 0.9],
            activation: activation(),
            gradient: Some(Array3::zeros((1, 1, 2))),
        };
        assert!(compute_channel_weights(&stub, "conv", &batch(), None).is_err());
    }
}
