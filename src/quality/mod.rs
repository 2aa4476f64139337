//! Frame-quality precheck engine
//!
//! Per-frame metric kernels (blur, exposure, motion, compression, faces),
//! the bounded precheck window, gate evaluation over that window, and the
//! on-demand ID document detector.
pub mod aggregator;
pub mod blur;
pub mod compression;
pub mod document;
pub mod exposure;
pub mod face;
pub mod motion;
pub mod validator;
pub mod window;

pub use aggregator::{FrameScorer, PrecheckAggregator, ScoredFrame};
pub use document::{DocumentDetection, DocumentDetector, Rect};
pub use face::{
    eye_aspect_ratio, DetectedFace, DetectorError, FaceBox, FaceDetector, FaceObservation,
    FaceSignal, Point,
};
pub use motion::MotionEstimator;
pub use validator::{evaluate, GateReport};
pub use window::{FrameMetrics, PrecheckWindow};
