//! Classifier Adapter: the frozen model seen as a black box exposing
//! forward inference, a layer-description list, and a recorded pass that
//! can be differentiated with respect to one named layer.

pub mod network_classifier;
pub mod prediction;

use image::RgbImage;
use ndarray::{Array3, Array4, ArrayView3, Axis};

use crate::error::{ExplainError, Result};
use crate::layers::LayerInfo;

pub use network_classifier::NetworkTape;
pub use prediction::{Diagnosis, PredictionResult};

/// A single preprocessed image as a batch of one: shape `(1, H, W, 3)`,
/// `f32` values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    data: Array4<f32>,
}

impl ImageBatch {
    pub fn new(data: Array4<f32>) -> Result<ImageBatch> {
        let (n, h, w, c) = data.dim();
        if n != 1 {
            return Err(ExplainError::InvalidInput(format!("expected a batch of one image, got {}", n)));
        }
        if c != 3 {
            return Err(ExplainError::InvalidInput(format!("expected 3 colour channels, got {}", c)));
        }
        if h == 0 || w == 0 {
            return Err(ExplainError::InvalidInput("image has no pixels".into()));
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
            return Err(ExplainError::InvalidInput("pixel values must lie in [0, 1]".into()));
        }
        Ok(ImageBatch { data })
    }

    /// Scales 8-bit RGB to `[0, 1]`.
    pub fn from_rgb(image: &RgbImage) -> ImageBatch {
        let (w, h) = image.dimensions();
        let data = Array4::from_shape_fn((1, h as usize, w as usize, 3), |(_, y, x, c)| {
            image.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        ImageBatch { data }
    }

    /// `(height, width, channels)` of the single sample.
    pub fn sample_shape(&self) -> (usize, usize, usize) {
        let (_, h, w, c) = self.data.dim();
        (h, w, c)
    }

    pub fn sample(&self) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }
}

/// Values recorded by one differentiable forward pass. The activation and
/// scores always come from the same execution.
pub trait GradientTape {
    /// Output of the watched layer, channels-last `(H', W', C)`.
    fn activation(&self) -> &Array3<f32>;

    fn scores(&self) -> &[f32];

    /// ∂scores[class_index] / ∂activation, or `None` when the recorded
    /// graph has no differentiable path from the watched layer to the
    /// scores.
    fn gradient(&self, class_index: usize) -> Result<Option<Array3<f32>>>;
}

/// Frozen classifier. Implementations must be pure functions of the input
/// and their fixed weights.
pub trait Classifier: Send + Sync {
    /// `[height, width, channels]` expected per sample.
    fn input_shape(&self) -> Vec<usize>;

    /// Class labels in output-index order.
    fn labels(&self) -> Vec<String>;

    /// Ordered layer-description list, input to output.
    fn layers(&self) -> Result<Vec<LayerInfo>>;

    fn forward(&self, batch: &ImageBatch) -> Result<Vec<f32>>;

    /// One combined pass recording `layer_name`'s output alongside the
    /// final scores.
    fn get_layer_output<'a>(&'a self, layer_name: &str, batch: &ImageBatch) -> Result<Box<dyn GradientTape + 'a>>;
}

/// Rejects batches whose sample shape differs from the classifier input.
pub(crate) fn check_batch_shape(expected: &[usize], batch: &ImageBatch) -> Result<()> {
    let (h, w, c) = batch.sample_shape();
    if expected != [h, w, c] {
        return Err(ExplainError::InvalidInput(format!(
            "expected image batch of shape (1, {}), got (1, {}, {}, {})",
            expected.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
            h, w, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn batch_rejects_out_of_range_and_bad_channels() {
        assert!(ImageBatch::new(Array4::from_elem((1, 4, 4, 3), 1.5)).is_err());
        assert!(ImageBatch::new(Array4::from_elem((1, 4, 4, 1), 0.5)).is_err());
        assert!(ImageBatch::new(Array4::from_elem((2, 4, 4, 3), 0.5)).is_err());
        assert!(ImageBatch::new(Array4::from_elem((1, 4, 4, 3), f32::NAN)).is_err());
        assert!(ImageBatch::new(Array4::from_elem((1, 4, 4, 3), 0.5)).is_ok());
    }

    #[test]
    fn from_rgb_scales_and_keeps_channel_order() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));
        let batch = ImageBatch::from_rgb(&img);
        assert_eq!(batch.sample_shape(), (1, 2, 3));
        let s = batch.sample();
        assert_eq!(s[[0, 1, 0]], 1.0);
        assert_eq!(s[[0, 1, 1]], 0.0);
        assert!((s[[0, 1, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn shape_check_reports_mismatch_as_input_error() {
        let batch = ImageBatch::new(Array4::from_elem((1, 4, 4, 3), 0.5)).unwrap();
        let err = check_batch_shape(&[224, 224, 3], &batch).unwrap_err();
        assert!(err.is_client_error());
        assert!(check_batch_shape(&[4, 4, 3], &batch).is_ok());
    }
}
