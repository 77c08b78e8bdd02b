//! Frozen layer set with forward inference and input-gradient backward.
//!
//! Every layer operates on a single sample (no batch axis). Feature maps
//! are channels-last `(H, W, C)`; dense activations are flat `(N,)`.

pub mod conv2d;
pub mod dense;
pub mod norm;
pub mod pool;

use ndarray::{Array, ArrayD, ArrayView1, ArrayView3, ArrayViewD, Axis, Ix1, Ix3, IxDyn};
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;
use crate::error::ModelError;

pub use conv2d::{Conv2d, Padding};
pub use dense::Dense;
pub use norm::BatchNorm;
pub use pool::MaxPool2d;

/// Type tag carried by every layer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Conv2d,
    MaxPool2d,
    GlobalAveragePool2d,
    BatchNormalization,
    Flatten,
    Dense,
    Dropout,
    StopGradient,
}

impl LayerKind {
    pub fn is_convolutional(&self) -> bool {
        matches!(self, LayerKind::Conv2d)
    }
}

/// One entry of a model's ordered layer-description list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    pub kind: LayerKind,
    pub output_shape: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerOp {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    GlobalAveragePool2d,
    BatchNormalization(BatchNorm),
    Flatten,
    Dense(Dense),
    /// Identity at inference time.
    Dropout {
        #[serde(default)]
        rate: f32,
    },
    /// Identity forward; no gradient flows back through it.
    StopGradient,
}

/// A named layer as stored in a model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(flatten)]
    pub op: LayerOp,
}

/// Values recorded for one layer during a traced forward pass.
#[derive(Debug, Clone)]
pub struct LayerTrace {
    pub input: ArrayD<f32>,
    /// `z` before the fused activation (conv and dense layers only).
    pub pre_activation: Option<ArrayD<f32>>,
    pub output: ArrayD<f32>,
}

fn shape_error(layer: &str, reason: impl ToString) -> ModelError {
    ModelError::Shape { layer: layer.to_owned(), reason: reason.to_string() }
}

impl Layer {
    pub fn new(name: impl Into<String>, op: LayerOp) -> Layer {
        Layer { name: name.into(), op }
    }

    pub fn kind(&self) -> LayerKind {
        match self.op {
            LayerOp::Conv2d(_) => LayerKind::Conv2d,
            LayerOp::MaxPool2d(_) => LayerKind::MaxPool2d,
            LayerOp::GlobalAveragePool2d => LayerKind::GlobalAveragePool2d,
            LayerOp::BatchNormalization(_) => LayerKind::BatchNormalization,
            LayerOp::Flatten => LayerKind::Flatten,
            LayerOp::Dense(_) => LayerKind::Dense,
            LayerOp::Dropout { .. } => LayerKind::Dropout,
            LayerOp::StopGradient => LayerKind::StopGradient,
        }
    }

    /// Output shape for a given input shape; fails if the layer's
    /// parameters are incompatible with that input.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, ModelError> {
        let shape = match &self.op {
            LayerOp::Conv2d(conv) => conv.output_shape(input),
            LayerOp::MaxPool2d(pool) => pool.output_shape(input),
            LayerOp::GlobalAveragePool2d => {
                if input.len() == 3 {
                    Ok(vec![input[2]])
                } else {
                    Err(format!("expected a (H, W, C) input, got {:?}", input))
                }
            }
            LayerOp::BatchNormalization(bn) => bn.output_shape(input),
            LayerOp::Flatten => Ok(vec![input.iter().product()]),
            LayerOp::Dense(dense) => dense.output_shape(input),
            LayerOp::Dropout { .. } | LayerOp::StopGradient => Ok(input.to_vec()),
        };
        shape.map_err(|reason| shape_error(&self.name, reason))
    }

    fn view3<'a>(&self, x: &'a ArrayD<f32>) -> Result<ArrayView3<'a, f32>, ModelError> {
        x.view().into_dimensionality::<Ix3>().map_err(|e| shape_error(&self.name, e))
    }

    fn view1<'a>(&self, x: &'a ArrayD<f32>) -> Result<ArrayView1<'a, f32>, ModelError> {
        x.view().into_dimensionality::<Ix1>().map_err(|e| shape_error(&self.name, e))
    }

    /// Runs the layer and records what the backward pass needs.
    pub fn forward(&self, input: ArrayD<f32>) -> Result<LayerTrace, ModelError> {
        let (pre_activation, output) = match &self.op {
            LayerOp::Conv2d(conv) => {
                let z = conv.convolve(self.view3(&input)?).into_dyn();
                let a = activate(conv.activation, &z);
                (Some(z), a)
            }
            LayerOp::Dense(dense) => {
                let z = dense.linear(self.view1(&input)?).into_dyn();
                let a = activate(dense.activation, &z);
                (Some(z), a)
            }
            LayerOp::MaxPool2d(pool) => (None, pool.pool(self.view3(&input)?).into_dyn()),
            LayerOp::GlobalAveragePool2d => {
                (None, pool::global_average_pool(self.view3(&input)?).into_dyn())
            }
            LayerOp::BatchNormalization(bn) => (None, bn.normalize(input.view())),
            LayerOp::Flatten => {
                let flat: Vec<f32> = input.iter().copied().collect();
                (None, Array::from_vec(flat).into_dyn())
            }
            LayerOp::Dropout { .. } | LayerOp::StopGradient => (None, input.clone()),
        };
        Ok(LayerTrace { input, pre_activation, output })
    }

    /// Maps ∂s/∂output to ∂s/∂input. `Ok(None)` means the layer has no
    /// differentiable path.
    pub fn backward(&self, trace: &LayerTrace, upstream: &ArrayD<f32>) -> Result<Option<ArrayD<f32>>, ModelError> {
        let grad = match &self.op {
            LayerOp::Conv2d(conv) => {
                let dz = self.activation_gradient(conv.activation, trace, upstream)?;
                let input = self.view3(&trace.input)?;
                conv.input_gradient(input.dim(), self.view3(&dz)?).into_dyn()
            }
            LayerOp::Dense(dense) => {
                let dz = self.activation_gradient(dense.activation, trace, upstream)?;
                dense.input_gradient(self.view1(&dz)?).into_dyn()
            }
            LayerOp::MaxPool2d(pool) => {
                pool.input_gradient(self.view3(&trace.input)?, self.view3(upstream)?).into_dyn()
            }
            LayerOp::GlobalAveragePool2d => {
                let input = self.view3(&trace.input)?;
                pool::global_average_pool_gradient(input.dim(), self.view1(upstream)?).into_dyn()
            }
            LayerOp::BatchNormalization(bn) => bn.input_gradient(upstream.view()),
            LayerOp::Flatten => {
                let values: Vec<f32> = upstream.iter().copied().collect();
                Array::from_shape_vec(IxDyn(trace.input.shape()), values)
                    .map_err(|e| shape_error(&self.name, e))?
            }
            LayerOp::Dropout { .. } => upstream.clone(),
            LayerOp::StopGradient => return Ok(None),
        };
        Ok(Some(grad))
    }

    fn activation_gradient(
        &self,
        f: ActivationFunction,
        trace: &LayerTrace,
        upstream: &ArrayD<f32>,
    ) -> Result<ArrayD<f32>, ModelError> {
        let z = trace
            .pre_activation
            .as_ref()
            .ok_or_else(|| shape_error(&self.name, "missing pre-activation in trace"))?;
        Ok(activation_backward(f, z.view(), trace.output.view(), upstream.view()))
    }
}

/// Applies `f` element-wise, or along the last axis for softmax.
fn activate(f: ActivationFunction, z: &ArrayD<f32>) -> ArrayD<f32> {
    match f {
        ActivationFunction::Softmax => {
            let last = Axis(z.ndim() - 1);
            let mut out = z.clone();
            for mut lane in out.lanes_mut(last) {
                let values = f.apply_slice(&lane.to_vec());
                for (o, v) in lane.iter_mut().zip(values) {
                    *o = v;
                }
            }
            out
        }
        _ => z.mapv(|x| f.function(x)),
    }
}

fn activation_backward(
    f: ActivationFunction,
    z: ArrayViewD<f32>,
    a: ArrayViewD<f32>,
    upstream: ArrayViewD<f32>,
) -> ArrayD<f32> {
    let last = Axis(z.ndim() - 1);
    let mut dz = upstream.to_owned();
    for ((mut d, z_lane), a_lane) in dz.lanes_mut(last).into_iter().zip(z.lanes(last)).zip(a.lanes(last)) {
        let g = f.backprop_slice(&z_lane.to_vec(), &a_lane.to_vec(), &d.to_vec());
        for (o, v) in d.iter_mut().zip(g) {
            *o = v;
        }
    }
    dz
}
