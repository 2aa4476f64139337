//! Sharpness scoring from the Laplacian response of the luma plane

use image::GrayImage;

/// Variance of the 4-neighbour Laplacian over interior pixels.
///
/// Higher means sharper. Frames smaller than 3x3 have no interior and
/// score 0.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let w = width as usize;
    let px = gray.as_raw();
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0usize;

    for y in 1..(height as usize - 1) {
        for x in 1..(w - 1) {
            let idx = y * w + x;
            let center = px[idx] as f64;
            let response =
                px[idx - 1] as f64 + px[idx + 1] as f64 + px[idx - w] as f64 + px[idx + w] as f64
                    - 4.0 * center;
            sum += response;
            sum_sq += response * response;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_uniform_image_has_zero_variance() {
        let gray = GrayImage::from_pixel(64, 64, Luma([128]));
        assert_eq!(laplacian_variance(&gray), 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        let gray = GrayImage::from_fn(64, 64, |x, y| {
            if ((x / 8) + (y / 8)) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        assert!(laplacian_variance(&gray) > 1000.0);
    }

    #[test]
    fn test_smooth_gradient_is_soft() {
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 2) as u8]));
        assert!(laplacian_variance(&gray) < 1.0);
    }

    #[test]
    fn test_tiny_frame_scores_zero() {
        assert_eq!(laplacian_variance(&GrayImage::new(2, 2)), 0.0);
    }
}
