//! Face detector seam and face-stability signals
//!
//! The detector itself is an external collaborator: it is constructed once
//! at startup and handed to the aggregator by reference. This module only
//! defines what the core consumes from it.

use crate::types::CaptureFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("face detector unavailable: {0}")]
    Unavailable(String),
    #[error("face detection failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned face bounds in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What the detector reports about each face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FaceSignal {
    /// Detector confidence in [0, 1]
    Confidence(f64),
    /// Six landmarks per eye, ordered p1..p6 around the eye contour
    EyeLandmarks { left: [Point; 6], right: [Point; 6] },
}

/// One detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bounds: FaceBox,
    pub signal: FaceSignal,
}

impl FaceObservation {
    pub fn with_confidence(bounds: FaceBox, confidence: f64) -> Self {
        Self {
            bounds,
            signal: FaceSignal::Confidence(confidence),
        }
    }

    /// Stability proxy: the confidence itself, or the eye-aspect-ratio
    /// averaged across both eyes
    pub fn stability(&self) -> f64 {
        match &self.signal {
            FaceSignal::Confidence(c) => *c,
            FaceSignal::EyeLandmarks { left, right } => {
                (eye_aspect_ratio(left) + eye_aspect_ratio(right)) / 2.0
            }
        }
    }
}

/// `(|p2-p6| + |p3-p5|) / (2 * |p1-p4|)`; 0 for a degenerate eye width
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f64 {
    let width = eye[0].distance(&eye[3]);
    if width <= f64::EPSILON {
        return 0.0;
    }
    (eye[1].distance(&eye[5]) + eye[2].distance(&eye[4])) / (2.0 * width)
}

/// Black-box face/landmark detector. May return zero faces.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &CaptureFrame) -> Result<Vec<FaceObservation>, DetectorError>;
}

/// Face entry retained in the precheck window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bounds: FaceBox,
    pub stability: f64,
}

impl From<&FaceObservation> for DetectedFace {
    fn from(obs: &FaceObservation) -> Self {
        Self {
            bounds: obs.bounds,
            stability: obs.stability(),
        }
    }
}

/// Run the detector, turning any failure into "no faces"
pub fn detect_faces(detector: &dyn FaceDetector, frame: &CaptureFrame) -> Vec<DetectedFace> {
    match detector.detect(frame) {
        Ok(faces) => faces.iter().map(DetectedFace::from).collect(),
        Err(e) => {
            log::warn!("Face detector failed on frame {}: {}", frame.sequence, e);
            Vec::new()
        }
    }
}
