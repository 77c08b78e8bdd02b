use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, ImageBuffer, Luma, RgbImage};
use ndarray::Array2;
use tracing::debug;

use crate::error::{ExplainError, Result};
use crate::gradcam::Heatmap;
use crate::overlay::colormap::apply_jet;
use crate::store::{ArtifactId, ArtifactStore};

/// Triangle-filtered resample of the heatmap to `width × height`.
fn upsample(heatmap: &Heatmap, width: u32, height: u32) -> Result<ImageBuffer<Luma<f32>, Vec<f32>>> {
    let (h, w) = heatmap.dim();
    let values: Vec<f32> = heatmap.values().iter().copied().collect();
    let map = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w as u32, h as u32, values)
        .ok_or_else(|| ExplainError::Configuration(format!("heatmap {}x{} is not a valid map", h, w)))?;
    Ok(imageops::resize(&map, width, height, FilterType::Triangle))
}

/// Upsamples the heatmap to `width × height`, quantizes it to 0..=255 and
/// maps it through the jet palette.
pub fn colorize(heatmap: &Heatmap, width: u32, height: u32) -> Result<RgbImage> {
    let resized = upsample(heatmap, width, height)?;
    let levels = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        (255.0 * resized.get_pixel(x as u32, y as u32).0[0].clamp(0.0, 1.0)) as u8
    });
    Ok(apply_jet(&levels))
}

/// `(1 - alpha) * base + alpha * overlay`, per pixel and channel, rounded
/// and saturated to 8 bits.
pub fn blend(base: &RgbImage, overlay: &RgbImage, alpha: f32) -> Result<RgbImage> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(ExplainError::Configuration(format!("overlay alpha {} outside [0, 1]", alpha)));
    }
    if base.dimensions() != overlay.dimensions() {
        return Err(ExplainError::InvalidInput(format!(
            "cannot blend {:?} image with {:?} heatmap",
            base.dimensions(),
            overlay.dimensions()
        )));
    }
    let (w, h) = base.dimensions();
    let mut out = RgbImage::new(w, h);
    for ((dst, src), heat) in out.pixels_mut().zip(base.pixels()).zip(overlay.pixels()) {
        for c in 0..3 {
            let v = (1.0 - alpha) * src.0[c] as f32 + alpha * heat.0[c] as f32;
            dst.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Heatmap overlay at the display image's resolution. The display image is
/// left untouched.
pub fn composite(heatmap: &Heatmap, display: &RgbImage, alpha: f32) -> Result<RgbImage> {
    let (w, h) = display.dimensions();
    let colored = colorize(heatmap, w, h)?;
    blend(display, &colored, alpha)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
    Ok(bytes)
}

/// Composites, encodes and stores the overlay under a fresh identifier.
pub fn render_overlay(
    heatmap: &Heatmap,
    display: &RgbImage,
    alpha: f32,
    jpeg_quality: u8,
    store: &dyn ArtifactStore,
) -> Result<ArtifactId> {
    let overlay = composite(heatmap, display, alpha)?;
    let bytes = encode_jpeg(&overlay, jpeg_quality)?;
    let id = ArtifactId::generate();
    store.put(&id, &bytes)?;
    debug!(artifact = %id, bytes = bytes.len(), "stored overlay");
    Ok(id)
}
