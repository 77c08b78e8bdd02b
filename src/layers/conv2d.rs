use ndarray::{Array1, Array3, Array4, ArrayView3};
use serde::{Serialize, Deserialize};

use crate::activation::ActivationFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding; windows that would overhang the input are dropped.
    #[default]
    Valid,
    /// Zero padding so that `out = ceil(in / stride)`; the extra row/column
    /// goes after the input when the total padding is odd.
    Same,
}

fn default_strides() -> [usize; 2] {
    [1, 1]
}

/// 2-D convolution over a channels-last `(H, W, C)` feature map with a
/// fused activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    /// Shape `(kernel_h, kernel_w, in_channels, filters)`.
    pub kernel: Array4<f32>,
    /// Shape `(filters,)`.
    pub bias: Array1<f32>,
    #[serde(default = "default_strides")]
    pub strides: [usize; 2],
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub activation: ActivationFunction,
}

/// Output length and leading padding along one spatial axis.
pub(crate) fn output_extent(input: usize, kernel: usize, stride: usize, padding: Padding) -> (usize, usize) {
    match padding {
        Padding::Valid => {
            if input < kernel {
                (0, 0)
            } else {
                ((input - kernel) / stride + 1, 0)
            }
        }
        Padding::Same => {
            let out = (input + stride - 1) / stride;
            let needed = (out.saturating_sub(1) * stride + kernel).saturating_sub(input);
            (out, needed / 2)
        }
    }
}

impl Conv2d {
    pub fn filters(&self) -> usize {
        self.kernel.dim().3
    }

    /// Output shape for an `(H, W, C)` input, or a reason why the input is
    /// incompatible.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        let (kh, kw, kc, oc) = self.kernel.dim();
        if input.len() != 3 {
            return Err(format!("expected a (H, W, C) input, got {:?}", input));
        }
        if input[2] != kc {
            return Err(format!("kernel expects {} input channels, got {}", kc, input[2]));
        }
        if self.bias.len() != oc {
            return Err(format!("bias has {} entries for {} filters", self.bias.len(), oc));
        }
        if self.strides.contains(&0) || kh == 0 || kw == 0 {
            return Err("strides and kernel dimensions must be positive".into());
        }
        let (oh, _) = output_extent(input[0], kh, self.strides[0], self.padding);
        let (ow, _) = output_extent(input[1], kw, self.strides[1], self.padding);
        if oh == 0 || ow == 0 {
            return Err(format!("kernel {}x{} does not fit input {:?}", kh, kw, input));
        }
        Ok(vec![oh, ow, oc])
    }

    /// Pre-activation output `z = x * K + b`.
    pub fn convolve(&self, x: ArrayView3<f32>) -> Array3<f32> {
        let (h, w, c) = x.dim();
        let (kh, kw, _, oc) = self.kernel.dim();
        let (sh, sw) = (self.strides[0], self.strides[1]);
        let (oh, pad_top) = output_extent(h, kh, sh, self.padding);
        let (ow, pad_left) = output_extent(w, kw, sw, self.padding);

        let mut z = Array3::zeros((oh, ow, oc));
        for oy in 0..oh {
            for ox in 0..ow {
                for ky in 0..kh {
                    let iy = (oy * sh + ky) as isize - pad_top as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..kw {
                        let ix = (ox * sw + kx) as isize - pad_left as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        for ci in 0..c {
                            let v = x[[iy as usize, ix as usize, ci]];
                            if v == 0.0 {
                                continue;
                            }
                            for o in 0..oc {
                                z[[oy, ox, o]] += v * self.kernel[[ky, kx, ci, o]];
                            }
                        }
                    }
                }
                for o in 0..oc {
                    z[[oy, ox, o]] += self.bias[o];
                }
            }
        }
        z
    }

    /// Gradient w.r.t. the layer input given ∂s/∂z (already passed through
    /// the activation derivative).
    pub fn input_gradient(&self, input_dim: (usize, usize, usize), dz: ArrayView3<f32>) -> Array3<f32> {
        let (h, w, c) = input_dim;
        let (kh, kw, _, oc) = self.kernel.dim();
        let (sh, sw) = (self.strides[0], self.strides[1]);
        let (_, pad_top) = output_extent(h, kh, sh, self.padding);
        let (_, pad_left) = output_extent(w, kw, sw, self.padding);
        let (oh, ow, _) = dz.dim();

        let mut dx = Array3::zeros((h, w, c));
        for oy in 0..oh {
            for ox in 0..ow {
                for ky in 0..kh {
                    let iy = (oy * sh + ky) as isize - pad_top as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..kw {
                        let ix = (ox * sw + kx) as isize - pad_left as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        for o in 0..oc {
                            let g = dz[[oy, ox, o]];
                            if g == 0.0 {
                                continue;
                            }
                            for ci in 0..c {
                                dx[[iy as usize, ix as usize, ci]] += g * self.kernel[[ky, kx, ci, o]];
                            }
                        }
                    }
                }
            }
        }
        dx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn unit_kernel(k: usize) -> Conv2d {
        Conv2d {
            kernel: Array4::from_elem((k, k, 1, 1), 1.0),
            bias: Array1::zeros(1),
            strides: [1, 1],
            padding: Padding::Valid,
            activation: ActivationFunction::Identity,
        }
    }

    #[test]
    fn extents_follow_valid_and_same_rules() {
        assert_eq!(output_extent(224, 3, 1, Padding::Valid), (222, 0));
        assert_eq!(output_extent(224, 3, 2, Padding::Same), (112, 0));
        assert_eq!(output_extent(7, 3, 1, Padding::Same), (7, 1));
        assert_eq!(output_extent(2, 3, 1, Padding::Valid), (0, 0));
    }

    #[test]
    fn box_filter_sums_window() {
        let conv = unit_kernel(2);
        let x = Array::from_shape_vec((3, 3, 1), (1..=9).map(|v| v as f32).collect()).unwrap();
        let z = conv.convolve(x.view());
        assert_eq!(z.dim(), (2, 2, 1));
        assert_eq!(z[[0, 0, 0]], 1.0 + 2.0 + 4.0 + 5.0);
        assert_eq!(z[[1, 1, 0]], 5.0 + 6.0 + 8.0 + 9.0);
    }

    #[test]
    fn same_padding_keeps_spatial_size() {
        let mut conv = unit_kernel(3);
        conv.padding = Padding::Same;
        let x = Array3::from_elem((5, 5, 1), 1.0);
        let z = conv.convolve(x.view());
        assert_eq!(z.dim(), (5, 5, 1));
        // corner sees a 2x2 window, centre the full 3x3
        assert_eq!(z[[0, 0, 0]], 4.0);
        assert_eq!(z[[2, 2, 0]], 9.0);
    }

    #[test]
    fn input_gradient_counts_window_coverage() {
        let conv = unit_kernel(2);
        let dz = Array3::from_elem((2, 2, 1), 1.0);
        let dx = conv.input_gradient((3, 3, 1), dz.view());
        // centre pixel participates in all four windows
        assert_eq!(dx[[1, 1, 0]], 4.0);
        assert_eq!(dx[[0, 0, 0]], 1.0);
        assert_eq!(dx[[0, 1, 0]], 2.0);
    }

    #[test]
    fn output_shape_rejects_channel_mismatch() {
        let conv = unit_kernel(3);
        assert!(conv.output_shape(&[8, 8, 3]).is_err());
        assert_eq!(conv.output_shape(&[8, 8, 1]).unwrap(), vec![6, 6, 1]);
    }
}
