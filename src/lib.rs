//! CrabKYC: capture gating, anti-fraud scoring and integrity-checked upload
//! for identity-verification flows
//!
//! This crate drives a scripted enrollment capture (selfie video with a
//! liveness challenge, then an ID-document video), scores frames for
//! forensic quality over a sliding window, records device and network
//! signals, and uploads the finished media with keyed-MAC and content
//! digests.
//!
//! # Features
//! - Capture state machine with generation-checked async results
//! - Blur, exposure, motion, compression and face-stability gates
//! - ID document shape detection with an MRZ darkness heuristic
//! - Device binding: install id, attestation, network class, time skew,
//!   sliding-window rate limiting
//! - HMAC-SHA256 + SHA-256 signed multipart upload over HTTPS
//!
//! # Usage
//! ```rust,no_run
//! use crabkyc::config::{CrabKycConfig, ThresholdStore};
//! use crabkyc::session::{CaptureController, CaptureSession};
//! use crabkyc::testing::ScriptedDetector;
//! use crabkyc::transport::{Mp4Probe, SecureTransport};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), crabkyc::KycError> {
//! crabkyc::init_logging();
//! let config = CrabKycConfig::load_or_default();
//! let thresholds = Arc::new(ThresholdStore::from_config(&config));
//! let session = CaptureSession::new(
//!     Arc::new(ScriptedDetector::single_face(0.9)),
//!     thresholds,
//!     &config.window,
//! );
//! let transport = SecureTransport::new(config.transport.clone(), Arc::new(Mp4Probe))?;
//! let controller = CaptureController::new(session, Arc::new(transport));
//! controller.advance().await?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod device;
pub mod errors;
pub mod pipeline;
pub mod quality;
pub mod session;
pub mod timing;
pub mod transport;
pub mod types;

// Testing utilities - synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::{CrabKycConfig, PrecheckThresholds, ThresholdStore};
pub use errors::{ConfigError, FrameError, KycError, SessionError};
pub use quality::{FrameMetrics, GateReport, PrecheckAggregator, PrecheckWindow};
pub use session::{CaptureController, CaptureSession, CaptureState, Challenge};
pub use types::CaptureFrame;

/// Initialize logging, defaulting to `crabkyc=info`
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabkyc=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "crabkyc");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
