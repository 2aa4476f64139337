//! Finished media files and their pre-upload sanity check

use super::MediaError;
use crate::config::TransportConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which recording a media file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Selfie,
    Document,
}

impl MediaKind {
    /// Multipart field carrying the file itself
    pub fn field_name(&self) -> &'static str {
        match self {
            MediaKind::Selfie => "selfie",
            MediaKind::Document => "id_video",
        }
    }

    pub fn hmac_field(&self) -> &'static str {
        match self {
            MediaKind::Selfie => "selfie_hmac",
            MediaKind::Document => "id_hmac",
        }
    }

    pub fn sha256_field(&self) -> &'static str {
        match self {
            MediaKind::Selfie => "selfie_sha256",
            MediaKind::Document => "id_sha256",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            MediaKind::Selfie => "selfie.mp4",
            MediaKind::Document => "id.mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Selfie => write!(f, "selfie"),
            MediaKind::Document => write!(f, "document"),
        }
    }
}

/// Handle to a finished recording on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub kind: MediaKind,
    pub path: PathBuf,
}

impl MediaFile {
    pub fn new(kind: MediaKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// What a probe extracts from a container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub frame_rate: f64,
}

/// Reads duration and frame rate from a finished file
pub trait MediaProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError>;
}

/// Gross sanity check: the file exists, can be probed, and both its
/// duration and frame rate sit inside the configured bands (inclusive).
pub fn check_media_integrity(
    probe: &dyn MediaProbe,
    file: &MediaFile,
    config: &TransportConfig,
) -> Result<MediaInfo, MediaError> {
    if !file.path.is_file() {
        return Err(MediaError::Missing {
            kind: file.kind,
            path: file.path.clone(),
        });
    }

    let info = probe.probe(&file.path)?;

    if !(config.min_duration_secs..=config.max_duration_secs).contains(&info.duration_secs) {
        return Err(MediaError::DurationOutOfRange {
            kind: file.kind,
            actual: info.duration_secs,
            min: config.min_duration_secs,
            max: config.max_duration_secs,
        });
    }
    if !(config.min_fps..=config.max_fps).contains(&info.frame_rate) {
        return Err(MediaError::FrameRateOutOfRange {
            kind: file.kind,
            actual: info.frame_rate,
            min: config.min_fps,
            max: config.max_fps,
        });
    }

    log::debug!(
        "{} media ok: {:.2}s at {:.2}fps",
        file.kind,
        info.duration_secs,
        info.frame_rate
    );
    Ok(info)
}
