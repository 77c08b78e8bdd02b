use ndarray::{Array1, Array3, ArrayView1, ArrayView3, Axis};
use serde::{Serialize, Deserialize};

/// Max pooling with `valid` padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub pool_size: [usize; 2],
    /// Defaults to `pool_size`.
    #[serde(default)]
    pub strides: Option<[usize; 2]>,
}

impl MaxPool2d {
    fn strides(&self) -> [usize; 2] {
        self.strides.unwrap_or(self.pool_size)
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, String> {
        let [ph, pw] = self.pool_size;
        let [sh, sw] = self.strides();
        if input.len() != 3 {
            return Err(format!("expected a (H, W, C) input, got {:?}", input));
        }
        if ph == 0 || pw == 0 || sh == 0 || sw == 0 {
            return Err("pool size and strides must be positive".into());
        }
        if input[0] < ph || input[1] < pw {
            return Err(format!("pool {}x{} does not fit input {:?}", ph, pw, input));
        }
        Ok(vec![(input[0] - ph) / sh + 1, (input[1] - pw) / sw + 1, input[2]])
    }

    /// Position of the first maximum inside the window at `(oy, ox)` for
    /// channel `c`.
    fn window_argmax(&self, x: &ArrayView3<f32>, oy: usize, ox: usize, c: usize) -> (usize, usize) {
        let [ph, pw] = self.pool_size;
        let [sh, sw] = self.strides();
        let mut best = (oy * sh, ox * sw);
        for ky in 0..ph {
            for kx in 0..pw {
                let (iy, ix) = (oy * sh + ky, ox * sw + kx);
                if x[[iy, ix, c]] > x[[best.0, best.1, c]] {
                    best = (iy, ix);
                }
            }
        }
        best
    }

    pub fn pool(&self, x: ArrayView3<f32>) -> Array3<f32> {
        let (h, w, c) = x.dim();
        let [ph, pw] = self.pool_size;
        let [sh, sw] = self.strides();
        let (oh, ow) = ((h - ph) / sh + 1, (w - pw) / sw + 1);
        let mut out = Array3::zeros((oh, ow, c));
        for oy in 0..oh {
            for ox in 0..ow {
                for ch in 0..c {
                    let (iy, ix) = self.window_argmax(&x, oy, ox, ch);
                    out[[oy, ox, ch]] = x[[iy, ix, ch]];
                }
            }
        }
        out
    }

    /// Routes each upstream value to the element that won its window.
    pub fn input_gradient(&self, x: ArrayView3<f32>, upstream: ArrayView3<f32>) -> Array3<f32> {
        let (oh, ow, c) = upstream.dim();
        let mut dx = Array3::zeros(x.dim());
        for oy in 0..oh {
            for ox in 0..ow {
                for ch in 0..c {
                    let (iy, ix) = self.window_argmax(&x, oy, ox, ch);
                    dx[[iy, ix, ch]] += upstream[[oy, ox, ch]];
                }
            }
        }
        dx
    }
}

pub fn global_average_pool(x: ArrayView3<f32>) -> Array1<f32> {
    let (h, w, c) = x.dim();
    if h * w == 0 {
        return Array1::zeros(c);
    }
    x.sum_axis(Axis(0)).sum_axis(Axis(0)) / (h * w) as f32
}

pub fn global_average_pool_gradient(input_dim: (usize, usize, usize), upstream: ArrayView1<f32>) -> Array3<f32> {
    let (h, w, c) = input_dim;
    let area = (h * w).max(1) as f32;
    Array3::from_shape_fn((h, w, c), |(_, _, ch)| upstream[ch] / area)
}
