//! Inter-frame motion scoring from dense optical flow
//!
//! Flow is estimated per pixel with a windowed Lucas-Kanade solve. The
//! five structure-tensor sums are taken from integral images so every
//! interior pixel gets a flow vector at constant cost.

use image::GrayImage;
use std::sync::Arc;

/// Half-width of the Lucas-Kanade aggregation window (15x15)
const WINDOW_RADIUS: usize = 7;

/// Structure tensors with a determinant below this are treated as
/// textureless and contribute zero flow
const MIN_DETERMINANT: f64 = 1e-3;

/// Holds the predecessor luma plane for motion scoring
#[derive(Debug, Default)]
pub struct MotionEstimator {
    previous: Option<Arc<GrayImage>>,
}

impl MotionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `current` against the retained predecessor, then retain
    /// `current` in its place. The first frame (or a frame whose size
    /// differs from its predecessor) scores 0.
    pub fn update(&mut self, current: GrayImage) -> f64 {
        let score = score_against(self.previous.as_deref(), &current);
        self.previous = Some(Arc::new(current));
        score
    }

    /// Shared handle to the retained predecessor, for scoring off-thread
    pub fn predecessor(&self) -> Option<Arc<GrayImage>> {
        self.previous.clone()
    }

    /// Replace the predecessor with a plane scored elsewhere
    pub fn retain(&mut self, current: Arc<GrayImage>) {
        self.previous = Some(current);
    }

    pub fn has_predecessor(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Motion score of `current` given an optional predecessor
pub fn score_against(previous: Option<&GrayImage>, current: &GrayImage) -> f64 {
    match previous {
        Some(prev) if prev.dimensions() == current.dimensions() => {
            mean_flow_magnitude(prev, current)
        }
        Some(prev) => {
            log::debug!(
                "Frame size changed {:?} -> {:?}, motion reset",
                prev.dimensions(),
                current.dimensions()
            );
            0.0
        }
        None => 0.0,
    }
}

/// Mean flow magnitude (pixels/frame) between two equally sized planes
pub fn mean_flow_magnitude(prev: &GrayImage, curr: &GrayImage) -> f64 {
    let (width, height) = curr.dimensions();
    let (w, h) = (width as usize, height as usize);
    let margin = WINDOW_RADIUS + 1;
    if w <= 2 * margin || h <= 2 * margin {
        return 0.0;
    }

    let p = prev.as_raw();
    let c = curr.as_raw();

    let mut ixx = vec![0.0f64; w * h];
    let mut iyy = vec![0.0f64; w * h];
    let mut ixy = vec![0.0f64; w * h];
    let mut ixt = vec![0.0f64; w * h];
    let mut iyt = vec![0.0f64; w * h];

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            // Spatial gradients averaged over both frames
            let gx = ((c[i + 1] as f64 - c[i - 1] as f64) + (p[i + 1] as f64 - p[i - 1] as f64))
                / 4.0;
            let gy = ((c[i + w] as f64 - c[i - w] as f64) + (p[i + w] as f64 - p[i - w] as f64))
                / 4.0;
            let gt = c[i] as f64 - p[i] as f64;
            ixx[i] = gx * gx;
            iyy[i] = gy * gy;
            ixy[i] = gx * gy;
            ixt[i] = gx * gt;
            iyt[i] = gy * gt;
        }
    }

    let sxx = integral(&ixx, w, h);
    let syy = integral(&iyy, w, h);
    let sxy = integral(&ixy, w, h);
    let sxt = integral(&ixt, w, h);
    let syt = integral(&iyt, w, h);

    let r = WINDOW_RADIUS;
    let mut total = 0.0f64;
    let mut count = 0usize;

    for y in margin..h - margin {
        for x in margin..w - margin {
            let (x0, y0, x1, y1) = (x - r, y - r, x + r + 1, y + r + 1);
            let a = window_sum(&sxx, w, x0, y0, x1, y1);
            let b = window_sum(&sxy, w, x0, y0, x1, y1);
            let d = window_sum(&syy, w, x0, y0, x1, y1);
            let ex = window_sum(&sxt, w, x0, y0, x1, y1);
            let ey = window_sum(&syt, w, x0, y0, x1, y1);

            let det = a * d - b * b;
            if det.abs() > MIN_DETERMINANT {
                let u = -(d * ex - b * ey) / det;
                let v = -(a * ey - b * ex) / det;
                total += (u * u + v * v).sqrt();
            }
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Summed-area table with a zero row and column, (w+1) x (h+1)
fn integral(values: &[f64], w: usize, h: usize) -> Vec<f64> {
    let stride = w + 1;
    let mut table = vec![0.0f64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0.0;
        for x in 0..w {
            row_sum += values[y * w + x];
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

#[inline]
fn window_sum(table: &[f64], w: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
    let stride = w + 1;
    table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
        + table[y0 * stride + x0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn pattern(w: u32, h: u32, shift: f64) -> GrayImage {
        let period = 24.0;
        GrayImage::from_fn(w, h, |x, y| {
            let xs = x as f64 - shift;
            let v = 128.0
                + 50.0 * (2.0 * std::f64::consts::PI * xs / period).sin()
                + 50.0 * (2.0 * std::f64::consts::PI * y as f64 / period).sin();
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn test_first_frame_scores_zero() {
        let mut estimator = MotionEstimator::new();
        assert_eq!(estimator.update(pattern(64, 64, 0.0)), 0.0);
        assert!(estimator.has_predecessor());
    }

    #[test]
    fn test_static_scene_has_no_motion() {
        let mut estimator = MotionEstimator::new();
        estimator.update(pattern(64, 64, 0.0));
        assert!(estimator.update(pattern(64, 64, 0.0)) < 1e-9);
    }

    #[test]
    fn test_one_pixel_shift_is_about_one() {
        let score = mean_flow_magnitude(&pattern(96, 96, 0.0), &pattern(96, 96, 1.0));
        assert!(score > 0.5 && score < 1.5, "score {score}");
    }

    #[test]
    fn test_flat_frames_are_textureless() {
        let a = GrayImage::from_pixel(48, 48, Luma([40]));
        let b = GrayImage::from_pixel(48, 48, Luma([90]));
        assert_eq!(mean_flow_magnitude(&a, &b), 0.0);
    }

    #[test]
    fn test_reset_drops_predecessor() {
        let mut estimator = MotionEstimator::new();
        estimator.update(pattern(64, 64, 0.0));
        estimator.reset();
        assert_eq!(estimator.update(pattern(64, 64, 3.0)), 0.0);
    }

    #[test]
    fn test_size_change_scores_zero() {
        let mut estimator = MotionEstimator::new();
        estimator.update(pattern(64, 64, 0.0));
        assert_eq!(estimator.update(pattern(48, 48, 1.0)), 0.0);
    }
}
