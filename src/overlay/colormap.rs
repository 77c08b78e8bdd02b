use image::{Rgb, RgbImage};
use ndarray::Array2;

/// Control points `(position, intensity)` of the jet palette, per channel.
const JET_RED: [(f32, f32); 5] = [(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: [(f32, f32); 6] = [(0.0, 0.0), (0.125, 0.0), (0.375, 1.0), (0.64, 1.0), (0.91, 0.0), (1.0, 0.0)];
const JET_BLUE: [(f32, f32); 5] = [(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn interpolate(points: &[(f32, f32)], t: f32) -> f32 {
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if t <= x1 {
            return y0 + (y1 - y0) * (t - x0) / (x1 - x0);
        }
    }
    points.last().map(|&(_, y)| y).unwrap_or(0.0)
}

/// Jet palette: 0 is dark blue, 255 dark red, passing through cyan,
/// green and yellow.
pub fn jet(level: u8) -> Rgb<u8> {
    let t = level as f32 / 255.0;
    let channel = |points: &[(f32, f32)]| (interpolate(points, t) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb([channel(&JET_RED), channel(&JET_GREEN), channel(&JET_BLUE)])
}

/// Maps an 8-bit intensity grid through the jet palette.
pub fn apply_jet(levels: &Array2<u8>) -> RgbImage {
    let lut: Vec<Rgb<u8>> = (0..=255u8).map(jet).collect();
    let (h, w) = levels.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| lut[levels[[y as usize, x as usize]] as usize])
}
