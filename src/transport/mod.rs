//! Integrity & transport protocol
//!
//! Media sanity checks, per-unit keyed-MAC and content digests, and the
//! multipart upload to the ingest endpoint. Nothing leaves the device
//! until every file has passed its sanity check and every unit has been
//! signed and re-verified.

pub mod client;
pub mod integrity;
pub mod media;
pub mod mp4;

use std::path::PathBuf;
use thiserror::Error;

pub use client::{IngestResponse, MediaUploader, SecureTransport, UploadReceipt, UploadRequest};
pub use integrity::{chunk_payload, ChunkRecord, ChunkVerification, IntegritySigner};
pub use media::{check_media_integrity, MediaFile, MediaInfo, MediaKind, MediaProbe};
pub use mp4::Mp4Probe;

/// Finished media file failed its pre-upload sanity check
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediaError {
    #[error("{kind} media file missing: {}", path.display())]
    Missing { kind: MediaKind, path: PathBuf },
    #[error("could not probe {}: {reason}", path.display())]
    Probe { path: PathBuf, reason: String },
    #[error("{kind} duration {actual:.2}s outside [{min}, {max}]")]
    DurationOutOfRange {
        kind: MediaKind,
        actual: f64,
        min: f64,
        max: f64,
    },
    #[error("{kind} frame rate {actual:.2}fps outside [{min}, {max}]")]
    FrameRateOutOfRange {
        kind: MediaKind,
        actual: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid signing key")]
    InvalidKey,
    #[error("refusing non-HTTPS endpoint: {0}")]
    InsecureEndpoint(String),
    #[error("media check failed: {0}")]
    Media(#[from] MediaError),
    #[error("integrity verification failed for {unit}")]
    IntegrityMismatch { unit: String },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected with status {status}")]
    Rejected { status: u16, body: String },
    #[error("nothing to upload")]
    EmptyUpload,
    #[error("failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl TransportError {
    /// Failures that happened before any request was sent
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self,
            TransportError::InvalidKey
                | TransportError::InsecureEndpoint(_)
                | TransportError::Media(_)
                | TransportError::IntegrityMismatch { .. }
                | TransportError::Io { .. }
                | TransportError::EmptyUpload
                | TransportError::Metadata(_)
        )
    }
}
