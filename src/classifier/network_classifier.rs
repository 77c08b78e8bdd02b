use ndarray::{Array3, Ix3};
use tracing::debug;

use crate::classifier::{check_batch_shape, Classifier, GradientTape, ImageBatch};
use crate::error::{ExplainError, ModelError, Result};
use crate::layers::LayerInfo;
use crate::network::{ForwardTrace, Network};

/// Recorded pass over a [`Network`] watching one layer.
pub struct NetworkTape<'a> {
    network: &'a Network,
    trace: ForwardTrace,
    layer_index: usize,
    activation: Array3<f32>,
}

impl GradientTape for NetworkTape<'_> {
    fn activation(&self) -> &Array3<f32> {
        &self.activation
    }

    fn scores(&self) -> &[f32] {
        &self.trace.scores
    }

    fn gradient(&self, class_index: usize) -> Result<Option<Array3<f32>>> {
        let grad = self.network.gradient_at(&self.trace, self.layer_index, class_index)?;
        grad.map(|g| g.into_dimensionality::<Ix3>())
            .transpose()
            .map_err(|e| ExplainError::Model(ModelError::Shape {
                layer: self.network.layers[self.layer_index].name.clone(),
                reason: e.to_string(),
            }))
    }
}

impl Classifier for Network {
    fn input_shape(&self) -> Vec<usize> {
        self.input_shape.clone()
    }

    fn labels(&self) -> Vec<String> {
        Network::labels(self)
    }

    fn layers(&self) -> Result<Vec<LayerInfo>> {
        Ok(self.describe()?)
    }

    fn forward(&self, batch: &ImageBatch) -> Result<Vec<f32>> {
        check_batch_shape(&self.input_shape, batch)?;
        Ok(Network::forward(self, batch.sample())?)
    }

    fn get_layer_output<'a>(&'a self, layer_name: &str, batch: &ImageBatch) -> Result<Box<dyn GradientTape + 'a>> {
        let layer_index = self.layer_index(layer_name).ok_or_else(|| {
            ExplainError::Configuration(format!("layer '{}' not found in model '{}'", layer_name, self.name))
        })?;
        check_batch_shape(&self.input_shape, batch)?;

        let trace = self.forward_traced(batch.sample())?;
        let activation = trace
            .output_of(layer_index)
            .cloned()
            .ok_or_else(|| ExplainError::Configuration(format!("layer '{}' produced no output", layer_name)))?
            .into_dimensionality::<Ix3>()
            .map_err(|_| {
                ExplainError::Configuration(format!("layer '{}' does not output a spatial feature map", layer_name))
            })?;
        debug!(layer = layer_name, shape = ?activation.dim(), "recorded layer output");

        Ok(Box::new(NetworkTape { network: self, trace, layer_index, activation }))
    }
}
