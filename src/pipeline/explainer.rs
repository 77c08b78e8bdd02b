use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::classifier::{Classifier, PredictionResult};
use crate::config::ExplainerConfig;
use crate::error::{ExplainError, Result};
use crate::gradcam::{compute_channel_weights, find_last_conv_layer, synthesize, Heatmap};
use crate::overlay::render_overlay;
use crate::pipeline::preprocess::{preprocess, InputImage};
use crate::store::{ArtifactId, ArtifactStore};

/// Outcome of one prediction-and-explanation call.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub prediction: PredictionResult,
    pub artifact_id: ArtifactId,
    /// Normalized heatmap at the feature-map resolution.
    pub heatmap: Heatmap,
    pub target_class_index: usize,
    pub used_fallback_gradient: bool,
}

/// The part of an [`Explanation`] a caller usually reports back.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationSummary {
    pub predicted_label: String,
    pub confidence: f32,
    pub artifact_id: String,
    pub raw_scores: Vec<f32>,
}

impl Explanation {
    pub fn summary(&self) -> ExplanationSummary {
        ExplanationSummary {
            predicted_label: self.prediction.predicted_label().to_owned(),
            confidence: self.prediction.confidence(),
            artifact_id: self.artifact_id.to_string(),
            raw_scores: self.prediction.raw_scores().to_vec(),
        }
    }
}

/// Runs classify → Grad-CAM → overlay for single images against a shared,
/// frozen classifier.
pub struct Explainer<C: Classifier, S: ArtifactStore> {
    classifier: Arc<C>,
    store: S,
    config: ExplainerConfig,
}

impl<C: Classifier, S: ArtifactStore> Explainer<C, S> {
    /// Fails if `config` is invalid or its input size disagrees with the
    /// classifier's `(H, W, 3)` input.
    pub fn new(classifier: Arc<C>, store: S, config: ExplainerConfig) -> Result<Self> {
        config.validate()?;
        let (w, h) = config.input_size;
        let expected = [h as usize, w as usize, 3];
        let actual = classifier.input_shape();
        if actual != expected {
            return Err(ExplainError::Configuration(format!(
                "classifier expects input {:?}, pipeline is configured for {:?}",
                actual, expected
            )));
        }
        Ok(Explainer { classifier, store, config })
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    /// Classifies `input` and renders a Grad-CAM overlay for `target`, or
    /// for the predicted class when `target` is `None`.
    pub fn explain(&self, input: &InputImage, target: Option<usize>) -> Result<Explanation> {
        self.run(input, target).map_err(|e| {
            if e.is_client_error() {
                error!(error = %e, "rejected explanation request");
            } else {
                error!(error = ?e, "explanation failed");
            }
            e
        })
    }

    fn run(&self, input: &InputImage, target: Option<usize>) -> Result<Explanation> {
        let (w, h) = self.config.input_size;
        let pre = preprocess(input, w, h)?;

        let scores = self.classifier.forward(&pre.batch)?;
        let prediction = PredictionResult::from_scores(scores, &self.classifier.labels())?;

        let layer = find_last_conv_layer(&self.classifier.layers()?)?;
        let target_class = target.unwrap_or_else(|| prediction.predicted_class_index());
        let weights = compute_channel_weights(self.classifier.as_ref(), &layer, &pre.batch, Some(target_class))?;
        let heatmap = synthesize(&weights.activation, &weights.weights)?;

        let artifact_id = render_overlay(
            &heatmap,
            &pre.display,
            self.config.alpha,
            self.config.jpeg_quality,
            &self.store,
        )?;

        info!(
            label = prediction.predicted_label(),
            confidence = prediction.confidence(),
            layer = %layer,
            target_class,
            fallback = weights.used_fallback,
            artifact = %artifact_id,
            "explained prediction"
        );

        Ok(Explanation {
            prediction,
            artifact_id,
            heatmap,
            target_class_index: weights.class_index,
            used_fallback_gradient: weights.used_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::{Layer, LayerOp};
    use crate::layers::dense::Dense;
    use crate::network::{Network, NetworkSpec, LayerSpec};
    use crate::store::MemoryArtifactStore;
    use ndarray::{Array1, Array2, Array3};

    fn small_spec() -> NetworkSpec {
        NetworkSpec {
            name: "tiny".into(),
            input_shape: vec![16, 16, 3],
            layers: vec![
                LayerSpec::Conv2d {
                    filters: 4,
                    kernel_size: [3, 3],
                    strides: [2, 2],
                    padding: crate::layers::Padding::Same,
                    activation: ActivationFunction::ReLU,
                },
                LayerSpec::GlobalAveragePool2d,
                LayerSpec::Dense { size: 2, activation: ActivationFunction::Softmax },
            ],
            metadata: None,
        }
    }

    fn config() -> ExplainerConfig {
        ExplainerConfig { input_size: (16, 16), ..ExplainerConfig::default() }
    }

    fn pixels() -> InputImage {
        InputImage::Pixels(Array3::from_shape_fn((20, 24, 3), |(y, x, c)| ((x * 9 + y * 5 + c * 40) % 256) as u8))
    }

    #[test]
    fn explains_and_stores_one_overlay() {
        let net = Network::from_spec(&small_spec(), 7).unwrap();
        let explainer = Explainer::new(Arc::new(net), MemoryArtifactStore::default(), config()).unwrap();
        let out = explainer.explain(&pixels(), None).unwrap();

        assert_eq!(out.target_class_index, out.prediction.predicted_class_index());
        assert_eq!(out.heatmap.dim(), (8, 8));
        assert!(out.heatmap.values().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(explainer.store().len(), 1);
        assert!(explainer.store().get(&out.artifact_id).is_ok());
        assert_eq!(out.summary().raw_scores.len(), 2);
    }

    #[test]
    fn model_without_conv_layers_is_a_configuration_error() {
        let dense = Layer::new(
            "dense",
            LayerOp::Dense(Dense {
                weights: Array2::zeros((16 * 16 * 3, 2)),
                bias: Array1::zeros(2),
                activation: ActivationFunction::Softmax,
            }),
        );
        let net = Network::new(
            "flat",
            vec![16, 16, 3],
            vec![Layer::new("flatten", LayerOp::Flatten), dense],
        )
        .unwrap();
        let explainer = Explainer::new(Arc::new(net), MemoryArtifactStore::default(), config()).unwrap();
        let err = explainer.explain(&pixels(), None).unwrap_err();
        assert!(matches!(err, ExplainError::Configuration(_)));
        assert!(explainer.store().is_empty());
    }

    #[test]
    fn input_size_must_match_the_classifier() {
        let net = Network::from_spec(&small_spec(), 7).unwrap();
        let result = Explainer::new(Arc::new(net), MemoryArtifactStore::default(), ExplainerConfig::default());
        assert!(matches!(result, Err(ExplainError::Configuration(_))));
    }

    #[test]
    fn out_of_range_target_is_rejected() {
        let net = Network::from_spec(&small_spec(), 7).unwrap();
        let explainer = Explainer::new(Arc::new(net), MemoryArtifactStore::default(), config()).unwrap();
        let err = explainer.explain(&pixels(), Some(5)).unwrap_err();
        assert!(err.is_client_error());
        assert!(explainer.store().is_empty());
    }
}
