//! Testing utilities for CrabKYC
//!
//! Deterministic frames, metric samples, scripted detectors and a minimal
//! MP4 writer so the precheck and transport paths can be exercised
//! without a camera, a face model or real recordings.

pub mod mp4_writer;
pub mod synthetic_data;

pub use mp4_writer::{minimal_mp4, mp4_box, write_minimal_mp4};
pub use synthetic_data::{
    checkerboard_frame, id_card_frame, metrics_sample, sinusoid_frame, synthetic_frame,
    uniform_frame, FailingDetector, ScriptedDetector,
};
