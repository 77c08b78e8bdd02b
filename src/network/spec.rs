use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::layers::Padding;
use crate::network::metadata::ModelMetadata;

/// Architecture-only description of one layer. Weights are drawn at build
/// time by `Network::from_spec`; input sizes are inferred from the previous
/// layer's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d {
        filters: usize,
        kernel_size: [usize; 2],
        #[serde(default = "unit_strides")]
        strides: [usize; 2],
        #[serde(default)]
        padding: Padding,
        activation: ActivationFunction,
    },
    MaxPool2d {
        pool_size: [usize; 2],
    },
    GlobalAveragePool2d,
    Flatten,
    Dense {
        size: usize,
        activation: ActivationFunction,
    },
    Dropout {
        rate: f32,
    },
    StopGradient,
}

fn unit_strides() -> [usize; 2] {
    [1, 1]
}

impl LayerSpec {
    /// Keras-style default layer name, e.g. `conv2d_1`.
    pub fn default_name(&self, ordinal: usize) -> String {
        let stem = match self {
            LayerSpec::Conv2d { .. } => "conv2d",
            LayerSpec::MaxPool2d { .. } => "max_pooling2d",
            LayerSpec::GlobalAveragePool2d => "global_average_pooling2d",
            LayerSpec::Flatten => "flatten",
            LayerSpec::Dense { .. } => "dense",
            LayerSpec::Dropout { .. } => "dropout",
            LayerSpec::StopGradient => "stop_gradient",
        };
        if ordinal == 0 { stem.to_owned() } else { format!("{}_{}", stem, ordinal) }
    }
}

/// A serializable description of a network architecture plus optional
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used as the model file stem.
    pub name: String,
    /// `[height, width, channels]` of one input sample.
    pub input_shape: Vec<usize>,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl NetworkSpec {
    /// Small fundus-sized CNN: two strided conv blocks, pooling, a dense
    /// softmax head over the two classes.
    pub fn fundus_default() -> NetworkSpec {
        NetworkSpec {
            name: "fundus_cnn".into(),
            input_shape: vec![224, 224, 3],
            layers: vec![
                LayerSpec::Conv2d {
                    filters: 8,
                    kernel_size: [3, 3],
                    strides: [2, 2],
                    padding: Padding::Same,
                    activation: ActivationFunction::ReLU,
                },
                LayerSpec::MaxPool2d { pool_size: [2, 2] },
                LayerSpec::Conv2d {
                    filters: 16,
                    kernel_size: [3, 3],
                    strides: [2, 2],
                    padding: Padding::Same,
                    activation: ActivationFunction::ReLU,
                },
                LayerSpec::MaxPool2d { pool_size: [2, 2] },
                LayerSpec::GlobalAveragePool2d,
                LayerSpec::Dropout { rate: 0.3 },
                LayerSpec::Dense { size: 2, activation: ActivationFunction::Softmax },
            ],
            metadata: Some(ModelMetadata {
                description: Some("Fundus photograph classifier (Normal / Diseased)".into()),
                output_labels: None,
            }),
        }
    }
}
