//! Frame types shared by the capture pipeline and the metrics engine

use crate::errors::FrameError;
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// One decoded camera frame, packed RGB8
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureFrame {
    /// Monotonic sequence number assigned at capture
    pub sequence: u64,
    /// Capture time in microseconds since the pipeline clock started
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CaptureFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            sequence: 0,
            timestamp_us: 0,
            width,
            height,
            data,
        }
    }

    pub fn with_timing(mut self, sequence: u64, timestamp_us: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height)
    }

    /// Check that the buffer matches the advertised RGB dimensions
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(FrameError::BufferMismatch {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Luma plane (BT.601 weights). Caller must have validated the frame.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let [r, g, b] = self.rgb_at(x, y);
            Luma([luminance(r, g, b)])
        })
    }
}

#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_validate_rejects_short_buffer() {
        let frame = CaptureFrame::new(vec![0; 10], 2, 2);
        assert!(matches!(
            frame.validate(),
            Err(FrameError::BufferMismatch { expected: 12, .. })
        ));
        assert!(CaptureFrame::new(vec![], 0, 4).validate().is_err());
    }

    #[test]
    fn test_from_image_roundtrips_pixels() {
        let img = RgbImage::from_pixel(4, 3, Rgb([10, 200, 30]));
        let frame = CaptureFrame::from_image(&DynamicImage::ImageRgb8(img));
        assert!(frame.validate().is_ok());
        assert_eq!(frame.rgb_at(3, 2), [10, 200, 30]);
    }

    #[test]
    fn test_gray_uses_bt601_weights() {
        let frame = CaptureFrame::new(vec![255, 0, 0, 0, 255, 0], 2, 1);
        let gray = frame.to_gray();
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
    }
}
