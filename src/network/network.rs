use std::collections::{HashMap, HashSet};
use std::path::Path;

use ndarray::{Array1, ArrayD, ArrayView3, Ix2, Ix4};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::error::ModelError;
use crate::layers::{Conv2d, Dense, Layer, LayerInfo, LayerOp, LayerTrace, MaxPool2d};
use crate::math::init;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::{LayerSpec, NetworkSpec};

/// A frozen, sequential convolutional network.
///
/// Inference never mutates the network: every pass records its
/// intermediate values in a per-call [`ForwardTrace`], so one instance can
/// serve concurrent callers behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    /// `[height, width, channels]` of one input sample.
    pub input_shape: Vec<usize>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
    pub layers: Vec<Layer>,
}

/// Per-layer values recorded by [`Network::forward_traced`].
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    pub layers: Vec<LayerTrace>,
    pub scores: Vec<f32>,
}

impl ForwardTrace {
    pub fn output_of(&self, layer_index: usize) -> Option<&ArrayD<f32>> {
        self.layers.get(layer_index).map(|t| &t.output)
    }
}

fn shape_error(layer: &str, reason: impl ToString) -> ModelError {
    ModelError::Shape { layer: layer.to_owned(), reason: reason.to_string() }
}

impl Network {
    /// Builds a network from explicit layers and checks that their shapes
    /// chain from `input_shape` to a flat score vector.
    pub fn new(name: impl Into<String>, input_shape: Vec<usize>, layers: Vec<Layer>) -> Result<Network, ModelError> {
        let network = Network { name: name.into(), input_shape, metadata: None, layers };
        network.validate()?;
        Ok(network)
    }

    /// Builds a randomly initialized network from an architecture spec.
    /// He init feeds rectifier activations, Xavier everything else.
    pub fn from_spec(spec: &NetworkSpec, seed: u64) -> Result<Network, ModelError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shape = spec.input_shape.clone();
        let mut ordinals: HashMap<String, usize> = HashMap::new();
        let mut layers = Vec::with_capacity(spec.layers.len());

        for layer_spec in &spec.layers {
            let stem = layer_spec.default_name(0);
            let ordinal = ordinals.entry(stem).or_insert(0);
            let name = layer_spec.default_name(*ordinal);
            *ordinal += 1;

            let op = match layer_spec {
                LayerSpec::Conv2d { filters, kernel_size, strides, padding, activation } => {
                    let channels = match shape.as_slice() {
                        [_, _, c] => *c,
                        other => return Err(shape_error(&name, format!("expected a (H, W, C) input, got {:?}", other))),
                    };
                    let [kh, kw] = *kernel_size;
                    let dims = [kh, kw, channels, *filters];
                    let fan_in = kh * kw * channels;
                    let kernel = if activation.is_rectifier() {
                        init::he(&mut rng, &dims, fan_in)
                    } else {
                        init::xavier(&mut rng, &dims, fan_in)
                    };
                    LayerOp::Conv2d(Conv2d {
                        kernel: kernel.into_dimensionality::<Ix4>().map_err(|e| shape_error(&name, e))?,
                        bias: Array1::zeros(*filters),
                        strides: *strides,
                        padding: *padding,
                        activation: *activation,
                    })
                }
                LayerSpec::MaxPool2d { pool_size } => {
                    LayerOp::MaxPool2d(MaxPool2d { pool_size: *pool_size, strides: None })
                }
                LayerSpec::GlobalAveragePool2d => LayerOp::GlobalAveragePool2d,
                LayerSpec::Flatten => LayerOp::Flatten,
                LayerSpec::Dense { size, activation } => {
                    let fan_in = match shape.as_slice() {
                        [n] => *n,
                        other => return Err(shape_error(&name, format!("expected a flat input, got {:?}", other))),
                    };
                    let weights = if activation.is_rectifier() {
                        init::he(&mut rng, &[fan_in, *size], fan_in)
                    } else {
                        init::xavier(&mut rng, &[fan_in, *size], fan_in)
                    };
                    LayerOp::Dense(Dense {
                        weights: weights.into_dimensionality::<Ix2>().map_err(|e| shape_error(&name, e))?,
                        bias: Array1::zeros(*size),
                        activation: *activation,
                    })
                }
                LayerSpec::Dropout { rate } => LayerOp::Dropout { rate: *rate },
                LayerSpec::StopGradient => LayerOp::StopGradient,
            };

            let layer = Layer::new(name, op);
            shape = layer.output_shape(&shape)?;
            layers.push(layer);
        }

        let mut network = Network::new(spec.name.clone(), spec.input_shape.clone(), layers)?;
        network.metadata = spec.metadata.clone();
        Ok(network)
    }

    /// Output shape of every layer, in order. Fails if layer names repeat,
    /// any layer does not accept its predecessor's output, or the final
    /// output is not a non-empty vector.
    pub fn validate(&self) -> Result<Vec<Vec<usize>>, ModelError> {
        if self.layers.is_empty() {
            return Err(shape_error(&self.name, "network has no layers"));
        }
        let mut seen = HashSet::with_capacity(self.layers.len());
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(shape_error(&layer.name, "layer name is used more than once"));
            }
        }
        let mut shape = self.input_shape.clone();
        let mut shapes = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            shape = layer.output_shape(&shape)?;
            shapes.push(shape.clone());
        }
        match shape.as_slice() {
            [n] if *n > 0 => Ok(shapes),
            other => Err(shape_error(
                &self.name,
                format!("final output must be a score vector, got {:?}", other),
            )),
        }
    }

    /// Ordered layer-description list (name, type tag, output shape).
    pub fn describe(&self) -> Result<Vec<LayerInfo>, ModelError> {
        let shapes = self.validate()?;
        Ok(self
            .layers
            .iter()
            .zip(shapes)
            .map(|(layer, output_shape)| LayerInfo {
                name: layer.name.clone(),
                kind: layer.kind(),
                output_shape,
            })
            .collect())
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    pub fn labels(&self) -> Vec<String> {
        self.metadata.clone().unwrap_or_default().labels()
    }

    fn check_input(&self, input: &ArrayView3<f32>) -> Result<(), ModelError> {
        if input.shape() != self.input_shape.as_slice() {
            return Err(shape_error(
                &self.name,
                format!("expected input {:?}, got {:?}", self.input_shape, input.shape()),
            ));
        }
        Ok(())
    }

    /// Forward pass returning the final score vector.
    pub fn forward(&self, input: ArrayView3<f32>) -> Result<Vec<f32>, ModelError> {
        self.check_input(&input)?;
        let mut current = input.to_owned().into_dyn();
        for layer in &self.layers {
            current = layer.forward(current)?.output;
        }
        Ok(current.iter().copied().collect())
    }

    /// Forward pass that keeps every layer's input, pre-activation and
    /// output for a later backward pass.
    pub fn forward_traced(&self, input: ArrayView3<f32>) -> Result<ForwardTrace, ModelError> {
        self.check_input(&input)?;
        let mut current = input.to_owned().into_dyn();
        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let trace = layer.forward(current)?;
            current = trace.output.clone();
            layers.push(trace);
        }
        let scores = current.iter().copied().collect();
        Ok(ForwardTrace { layers, scores })
    }

    /// Gradient of `scores[class_index]` with respect to the output of the
    /// layer at `layer_index`.
    ///
    /// Returns `Ok(None)` when a layer between the two has no gradient path
    /// (e.g. `stop_gradient`).
    pub fn gradient_at(
        &self,
        trace: &ForwardTrace,
        layer_index: usize,
        class_index: usize,
    ) -> Result<Option<ArrayD<f32>>, ModelError> {
        if layer_index >= self.layers.len() || trace.layers.len() != self.layers.len() {
            return Err(shape_error(&self.name, format!("layer index {} out of range", layer_index)));
        }
        if class_index >= trace.scores.len() {
            return Err(shape_error(
                &self.name,
                format!("class index {} out of range for {} scores", class_index, trace.scores.len()),
            ));
        }

        let mut upstream = ArrayD::<f32>::zeros(trace.layers[self.layers.len() - 1].output.raw_dim());
        if let Some(slot) = upstream.iter_mut().nth(class_index) {
            *slot = 1.0;
        }

        for i in (layer_index + 1..self.layers.len()).rev() {
            match self.layers[i].backward(&trace.layers[i], &upstream)? {
                Some(grad) => upstream = grad,
                None => {
                    debug!(layer = %self.layers[i].name, "no gradient path through layer");
                    return Ok(None);
                }
            }
        }
        Ok(Some(upstream))
    }

    /// Serializes the network to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes and validates a network from a JSON file previously
    /// written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Network, ModelError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader)?;
        network.validate()?;
        info!(
            path = %path.display(),
            name = %network.name,
            layers = network.layers.len(),
            "loaded model"
        );
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::{LayerKind, Padding};
    use ndarray::{Array2, Array3, Array4};

    fn tiny_spec() -> NetworkSpec {
        NetworkSpec {
            name: "tiny".into(),
            input_shape: vec![8, 8, 3],
            layers: vec![
                LayerSpec::Conv2d {
                    filters: 4,
                    kernel_size: [3, 3],
                    strides: [1, 1],
                    padding: Padding::Same,
                    activation: ActivationFunction::Tanh,
                },
                LayerSpec::Conv2d {
                    filters: 2,
                    kernel_size: [3, 3],
                    strides: [2, 2],
                    padding: Padding::Valid,
                    activation: ActivationFunction::Sigmoid,
                },
                LayerSpec::Flatten,
                LayerSpec::Dense { size: 2, activation: ActivationFunction::Softmax },
            ],
            metadata: None,
        }
    }

    fn sample_input(shape: (usize, usize, usize)) -> Array3<f32> {
        Array3::from_shape_fn(shape, |(h, w, c)| ((h * 7 + w * 3 + c) % 11) as f32 / 10.0)
    }

    #[test]
    fn from_spec_names_layers_like_keras() {
        let net = Network::from_spec(&tiny_spec(), 1).unwrap();
        let names: Vec<&str> = net.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["conv2d", "conv2d_1", "flatten", "dense"]);
        let info = net.describe().unwrap();
        assert_eq!(info[1].kind, LayerKind::Conv2d);
        assert_eq!(info[1].output_shape, vec![3, 3, 2]);
        assert_eq!(info[3].output_shape, vec![2]);
    }

    #[test]
    fn softmax_head_produces_distribution() {
        let net = Network::from_spec(&tiny_spec(), 3).unwrap();
        let scores = net.forward(sample_input((8, 8, 3)).view()).unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn forward_is_deterministic_and_matches_trace() {
        let net = Network::from_spec(&tiny_spec(), 3).unwrap();
        let x = sample_input((8, 8, 3));
        let a = net.forward(x.view()).unwrap();
        let b = net.forward(x.view()).unwrap();
        let trace = net.forward_traced(x.view()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, trace.scores);
    }

    #[test]
    fn wrong_input_shape_is_rejected() {
        let net = Network::from_spec(&tiny_spec(), 3).unwrap();
        assert!(net.forward(sample_input((9, 8, 3)).view()).is_err());
    }

    #[test]
    fn dense_on_feature_map_fails_validation() {
        let mut spec = tiny_spec();
        spec.layers.remove(2);
        assert!(Network::from_spec(&spec, 1).is_err());
    }

    /// conv → GAP → identity dense: ∂score_c/∂A[h,w,k] = W[k,c] / (H·W).
    #[test]
    fn gradient_through_pooling_head_is_analytic() {
        let conv = Conv2d {
            kernel: Array4::from_shape_fn((1, 1, 1, 3), |(_, _, _, o)| o as f32 + 1.0),
            bias: Array1::zeros(3),
            strides: [1, 1],
            padding: Padding::Valid,
            activation: ActivationFunction::Identity,
        };
        let weights = Array2::from_shape_vec((3, 2), vec![1.0, -1.0, 2.0, 0.5, -3.0, 4.0]).unwrap();
        let net = Network::new(
            "analytic",
            vec![4, 4, 1],
            vec![
                Layer::new("conv", LayerOp::Conv2d(conv)),
                Layer::new("gap", LayerOp::GlobalAveragePool2d),
                Layer::new(
                    "head",
                    LayerOp::Dense(Dense {
                        weights: weights.clone(),
                        bias: Array1::zeros(2),
                        activation: ActivationFunction::Identity,
                    }),
                ),
            ],
        )
        .unwrap();

        let x = sample_input((4, 4, 1));
        let trace = net.forward_traced(x.view()).unwrap();
        let grad = net.gradient_at(&trace, 0, 1).unwrap().unwrap();
        assert_eq!(grad.shape(), &[4, 4, 3]);
        for ((_, _, k), &g) in grad.into_dimensionality::<ndarray::Ix3>().unwrap().indexed_iter() {
            assert!((g - weights[[k, 1]] / 16.0).abs() < 1e-6);
        }
    }

    #[test]
    fn repeated_layer_names_are_rejected() {
        let pointwise = Conv2d {
            kernel: Array4::from_elem((1, 1, 1, 2), 0.5),
            bias: Array1::zeros(2),
            strides: [1, 1],
            padding: Padding::Valid,
            activation: ActivationFunction::ReLU,
        };
        let strided = Conv2d {
            kernel: Array4::from_elem((2, 2, 2, 5), 0.1),
            bias: Array1::zeros(5),
            strides: [2, 2],
            padding: Padding::Valid,
            activation: ActivationFunction::ReLU,
        };
        let layers = vec![
            Layer::new("conv", LayerOp::Conv2d(pointwise)),
            Layer::new("conv", LayerOp::Conv2d(strided)),
            Layer::new("gap", LayerOp::GlobalAveragePool2d),
        ];
        let err = Network::new("dup", vec![4, 4, 1], layers.clone()).unwrap_err();
        assert!(matches!(err, ModelError::Shape { ref layer, .. } if layer == "conv"), "{err}");

        let mut renamed = layers;
        renamed[1].name = "conv_1".into();
        let net = Network::new("unique", vec![4, 4, 1], renamed).unwrap();
        assert_eq!(net.layer_index("conv_1"), Some(1));
    }

    #[test]
    fn duplicate_names_in_a_model_file_fail_to_load() {
        let mut net = Network::from_spec(&tiny_spec(), 5).unwrap();
        net.layers[1].name = net.layers[0].name.clone();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.json");
        std::fs::write(&path, serde_json::to_string(&net).unwrap()).unwrap();
        assert!(matches!(Network::load_json(&path), Err(ModelError::Shape { .. })));
    }

    #[test]
    fn gradient_matches_finite_difference_through_softmax() {
        let net = Network::from_spec(&tiny_spec(), 11).unwrap();
        let x = sample_input((8, 8, 3));
        let trace = net.forward_traced(x.view()).unwrap();
        let grad = net.gradient_at(&trace, 0, 1).unwrap().unwrap();

        // Re-run the tail of the network from a perturbed first-layer output.
        let tail_score = |activation: ArrayD<f32>| -> f32 {
            let mut current = activation;
            for layer in &net.layers[1..] {
                current = layer.forward(current).unwrap().output;
            }
            current[[1]]
        };

        let base = trace.output_of(0).unwrap().clone();
        let eps = 1e-2_f32;
        for idx in [[0usize, 0, 0], [3, 4, 1], [7, 7, 3], [5, 2, 2]] {
            let mut plus = base.clone();
            plus[&idx[..]] += eps;
            let mut minus = base.clone();
            minus[&idx[..]] -= eps;
            let fd = (tail_score(plus) - tail_score(minus)) / (2.0 * eps);
            let analytic = grad[&idx[..]];
            assert!((fd - analytic).abs() < 2e-3, "at {:?}: fd={} analytic={}", idx, fd, analytic);
        }
    }

    #[test]
    fn stop_gradient_cuts_the_backward_pass() {
        let mut spec = tiny_spec();
        spec.layers.insert(2, LayerSpec::StopGradient);
        let net = Network::from_spec(&spec, 5).unwrap();
        let trace = net.forward_traced(sample_input((8, 8, 3)).view()).unwrap();
        assert!(net.gradient_at(&trace, 1, 0).unwrap().is_none());
        // Layers after the cut still differentiate.
        assert!(net.gradient_at(&trace, 3, 0).unwrap().is_some());
    }

    #[test]
    fn json_round_trip_preserves_scores() {
        let net = Network::from_spec(&tiny_spec(), 9).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.json");
        net.save_json(&path).unwrap();
        let loaded = Network::load_json(&path).unwrap();
        let x = sample_input((8, 8, 3));
        assert_eq!(net.forward(x.view()).unwrap(), loaded.forward(x.view()).unwrap());
    }

    #[test]
    fn default_labels_are_normal_then_diseased() {
        let net = Network::from_spec(&tiny_spec(), 1).unwrap();
        assert_eq!(net.labels(), vec!["Normal".to_string(), "Diseased".to_string()]);
    }
}
