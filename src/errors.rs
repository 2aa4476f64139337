use thiserror::Error;

pub use crate::device::attestation::AttestationError;
pub use crate::device::network::NetworkProbeError;
pub use crate::quality::face::DetectorError;
pub use crate::transport::{MediaError, TransportError};

/// Configuration loading, parsing and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(String),
    #[error("Failed to serialize config: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A frame that cannot be scored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame has zero dimension ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("frame buffer holds {actual} bytes, expected {expected} for RGB {width}x{height}")]
    BufferMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Capture flow errors surfaced to the caller driving the state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is in terminal state {0}")]
    Terminal(&'static str),
    #[error("media can only be attached after its recording phase (current state {0})")]
    MediaOutOfPhase(&'static str),
    #[error("no device binding scorer configured")]
    NoScorer,
}

/// Crate-level error aggregating every subsystem
#[derive(Debug, Error)]
pub enum KycError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::BufferMismatch {
            width: 2,
            height: 2,
            expected: 12,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "frame buffer holds 4 bytes, expected 12 for RGB 2x2"
        );
    }

    #[test]
    fn test_kyc_error_wraps_subsystems() {
        let err: KycError = SessionError::Terminal("DONE").into();
        assert!(err.to_string().contains("terminal state DONE"));

        let err: KycError = ConfigError::Invalid("blur_min must be >= 0".into()).into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
