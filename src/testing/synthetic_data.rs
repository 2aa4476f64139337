//! Synthetic frames, metrics and detectors for offline testing
//!
//! Every generator is deterministic so gate decisions in tests are
//! reproducible without a camera or a face model.

use crate::quality::{
    DetectedFace, DetectorError, FaceBox, FaceDetector, FaceObservation, FrameMetrics,
};
use crate::types::CaptureFrame;

/// Gradient frame whose content shifts with the frame number
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> CaptureFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];
    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }
    CaptureFrame::new(data, width, height).with_timing(frame_number, frame_number * 33_333)
}

/// Flat grey frame
pub fn uniform_frame(width: u32, height: u32, value: u8) -> CaptureFrame {
    CaptureFrame::new(vec![value; (width * height * 3) as usize], width, height)
}

/// Black/white checkerboard with square cells of `cell` pixels
pub fn checkerboard_frame(width: u32, height: u32, cell: u32) -> CaptureFrame {
    let cell = cell.max(1);
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = if ((x / cell) + (y / cell)) % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    CaptureFrame::new(data, width, height)
}

/// Smooth 2-D sinusoid translated horizontally by `shift` pixels
pub fn sinusoid_frame(width: u32, height: u32, shift: f64) -> CaptureFrame {
    let period = 24.0;
    let tau = 2.0 * std::f64::consts::PI;
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = 128.0
                + 50.0 * (tau * (x as f64 - shift) / period).sin()
                + 50.0 * (tau * y as f64 / period).sin();
            let v = v.round().clamp(0.0, 255.0) as u8;
            data.extend_from_slice(&[v, v, v]);
        }
    }
    CaptureFrame::new(data, width, height)
}

/// White canvas with a centred card: mid-grey body and a bottom third
/// filled with `band_luma`
pub fn id_card_frame(
    width: u32,
    height: u32,
    card_width: u32,
    card_height: u32,
    band_luma: u8,
) -> CaptureFrame {
    const BACKGROUND: u8 = 255;
    const BODY: u8 = 120;

    let x0 = width.saturating_sub(card_width) / 2;
    let y0 = height.saturating_sub(card_height) / 2;
    let band_start = card_height - card_height / 3;

    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let inside = x >= x0 && x < x0 + card_width && y >= y0 && y < y0 + card_height;
            let v = if !inside {
                BACKGROUND
            } else if y - y0 >= band_start {
                band_luma
            } else {
                BODY
            };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    CaptureFrame::new(data, width, height)
}

fn face_box() -> FaceBox {
    FaceBox {
        x: 100.0,
        y: 80.0,
        width: 120.0,
        height: 150.0,
    }
}

/// Pre-computed metrics entry with `faces` identical faces
pub fn metrics_sample(
    blur: f64,
    exposure: f64,
    motion: f64,
    compression: f64,
    faces: usize,
    stability: f64,
) -> FrameMetrics {
    FrameMetrics {
        sequence: 0,
        timestamp_us: 0,
        blur,
        exposure,
        motion,
        compression,
        faces: vec![
            DetectedFace {
                bounds: face_box(),
                stability,
            };
            faces
        ],
    }
}

/// Detector returning the same observations for every frame
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    faces: Vec<FaceObservation>,
}

impl ScriptedDetector {
    pub fn new(faces: Vec<FaceObservation>) -> Self {
        Self { faces }
    }

    pub fn no_faces() -> Self {
        Self::default()
    }

    pub fn single_face(confidence: f64) -> Self {
        Self::faces(1, confidence)
    }

    pub fn faces(count: usize, confidence: f64) -> Self {
        Self::new(vec![
            FaceObservation::with_confidence(face_box(), confidence);
            count
        ])
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&self, _frame: &CaptureFrame) -> Result<Vec<FaceObservation>, DetectorError> {
        Ok(self.faces.clone())
    }
}

/// Detector that always errors
#[derive(Debug, Clone, Default)]
pub struct FailingDetector;

impl FaceDetector for FailingDetector {
    fn detect(&self, _frame: &CaptureFrame) -> Result<Vec<FaceObservation>, DetectorError> {
        Err(DetectorError::Unavailable("no model loaded".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frame_correct_size() {
        let frame = synthetic_frame(0, 320, 240);
        assert_eq!(frame.data.len(), 320 * 240 * 3);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_synthetic_frames_differ() {
        let frame0 = synthetic_frame(0, 64, 48);
        let frame1 = synthetic_frame(1, 64, 48);
        assert_ne!(frame0.data[0], frame1.data[0]);
        assert!(frame1.timestamp_us > frame0.timestamp_us);
    }

    #[test]
    fn test_id_card_layout() {
        let frame = id_card_frame(400, 300, 232, 160, 20);
        // Outside, body, band
        assert_eq!(frame.rgb_at(10, 10), [255, 255, 255]);
        assert_eq!(frame.rgb_at(200, 100), [120, 120, 120]);
        assert_eq!(frame.rgb_at(200, 225), [20, 20, 20]);
    }

    #[test]
    fn test_scripted_detectors() {
        let frame = uniform_frame(4, 4, 0);
        assert_eq!(ScriptedDetector::faces(2, 0.8).detect(&frame).unwrap().len(), 2);
        assert!(ScriptedDetector::no_faces().detect(&frame).unwrap().is_empty());
        assert!(FailingDetector.detect(&frame).is_err());
    }
}
