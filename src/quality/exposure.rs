//! Brightness scoring

use crate::types::CaptureFrame;

/// Mean HSV value channel (per-pixel max of R, G, B), 0-255
pub fn mean_value(frame: &CaptureFrame) -> f64 {
    let pixels = frame.data.len() / 3;
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = frame
        .data
        .chunks_exact(3)
        .map(|rgb| rgb[0].max(rgb[1]).max(rgb[2]) as u64)
        .sum();
    total as f64 / pixels as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_channel_takes_brightest_component() {
        let frame = CaptureFrame::new(vec![10, 200, 30, 90, 20, 40], 2, 1);
        assert_eq!(mean_value(&frame), 145.0);
    }

    #[test]
    fn test_empty_frame_is_dark() {
        assert_eq!(mean_value(&CaptureFrame::new(vec![], 0, 0)), 0.0);
    }
}
