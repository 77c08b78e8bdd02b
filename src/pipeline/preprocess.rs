use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array3;
use tracing::debug;

use crate::classifier::ImageBatch;
use crate::error::{ExplainError, Result};

/// Raw image handed to the pipeline by a caller.
#[derive(Debug, Clone)]
pub enum InputImage {
    /// Encoded file contents (PNG, JPEG, BMP or GIF).
    Encoded(Vec<u8>),
    /// Decoded 8-bit pixels, `(height, width, channels)` in RGB order.
    Pixels(Array3<u8>),
}

/// Model-ready input together with the display copy the overlay is
/// blended onto.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub display: RgbImage,
    pub batch: ImageBatch,
}

fn to_rgb(input: &InputImage) -> Result<RgbImage> {
    match input {
        InputImage::Encoded(bytes) => {
            if bytes.is_empty() {
                return Err(ExplainError::InvalidInput("empty image upload".into()));
            }
            let decoded = image::load_from_memory(bytes)
                .map_err(|e| ExplainError::InvalidInput(format!("cannot decode image: {}", e)))?;
            Ok(decoded.to_rgb8())
        }
        InputImage::Pixels(pixels) => {
            let (h, w, c) = pixels.dim();
            if c != 3 {
                return Err(ExplainError::InvalidInput(format!("expected 3 colour channels, got {}", c)));
            }
            if h == 0 || w == 0 {
                return Err(ExplainError::InvalidInput("image has no pixels".into()));
            }
            Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
                let (x, y) = (x as usize, y as usize);
                image::Rgb([pixels[[y, x, 0]], pixels[[y, x, 1]], pixels[[y, x, 2]]])
            }))
        }
    }
}

/// Decodes, converts to RGB and bilinearly resizes to `width × height`.
/// The resized image is both the display copy and, scaled to `[0, 1]`,
/// the model input.
pub fn preprocess(input: &InputImage, width: u32, height: u32) -> Result<Preprocessed> {
    let rgb = to_rgb(input)?;
    debug!(from = ?rgb.dimensions(), to = ?(width, height), "resizing input");
    let display = if rgb.dimensions() == (width, height) {
        rgb
    } else {
        imageops::resize(&rgb, width, height, FilterType::Triangle)
    };
    let batch = ImageBatch::from_rgb(&display);
    Ok(Preprocessed { display, batch })
}
