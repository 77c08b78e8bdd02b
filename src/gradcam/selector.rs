use crate::error::{ExplainError, Result};
use crate::layers::LayerInfo;

/// Name of the last convolutional layer in forward order.
///
/// Walks the layer list from the output back to the input and stops at the
/// first record tagged convolutional. A model without one cannot be
/// explained with class activation maps.
pub fn find_last_conv_layer(layers: &[LayerInfo]) -> Result<String> {
    layers
        .iter()
        .rev()
        .find(|layer| layer.kind.is_convolutional())
        .map(|layer| layer.name.clone())
        .ok_or_else(|| ExplainError::Configuration("no convolutional layer found in model".into()))
}
