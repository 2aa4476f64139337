//! Block-variance proxy for compression artifacts

use image::GrayImage;

/// Average per-block luma variance over non-overlapping `block_size` blocks.
///
/// Partial blocks at the right and bottom edges are ignored. Returns 0
/// when the frame holds no complete block.
pub fn mean_block_variance(gray: &GrayImage, block_size: u32) -> f64 {
    let bs = block_size.max(1) as usize;
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let rows = h / bs;
    let cols = w / bs;
    if rows == 0 || cols == 0 {
        return 0.0;
    }

    let px = gray.as_raw();
    let n = (bs * bs) as f64;
    let mut total = 0.0f64;

    for by in 0..rows {
        for bx in 0..cols {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for y in (by * bs)..(by * bs + bs) {
                let row = &px[y * w + bx * bs..y * w + bx * bs + bs];
                for &v in row {
                    let v = v as f64;
                    sum += v;
                    sum_sq += v * v;
                }
            }
            let mean = sum / n;
            total += (sum_sq / n - mean * mean).max(0.0);
        }
    }

    total / (rows * cols) as f64
}
