//! Capture flow states and the liveness challenge

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureState {
    Idle,
    SelfieGuide,
    SelfieRecordActive,
    SelfieRecordPassive,
    IdGuide,
    IdRecordTilt,
    IdRecordBack,
    ReviewPrechecks,
    Upload,
    Done,
    Retry,
}

impl CaptureState {
    pub const ALL: [CaptureState; 11] = [
        CaptureState::Idle,
        CaptureState::SelfieGuide,
        CaptureState::SelfieRecordActive,
        CaptureState::SelfieRecordPassive,
        CaptureState::IdGuide,
        CaptureState::IdRecordTilt,
        CaptureState::IdRecordBack,
        CaptureState::ReviewPrechecks,
        CaptureState::Upload,
        CaptureState::Done,
        CaptureState::Retry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "IDLE",
            CaptureState::SelfieGuide => "SELFIE_GUIDE",
            CaptureState::SelfieRecordActive => "SELFIE_RECORD_ACTIVE",
            CaptureState::SelfieRecordPassive => "SELFIE_RECORD_PASSIVE",
            CaptureState::IdGuide => "ID_GUIDE",
            CaptureState::IdRecordTilt => "ID_RECORD_TILT",
            CaptureState::IdRecordBack => "ID_RECORD_BACK",
            CaptureState::ReviewPrechecks => "REVIEW_PRECHECKS",
            CaptureState::Upload => "UPLOAD",
            CaptureState::Done => "DONE",
            CaptureState::Retry => "RETRY",
        }
    }

    /// Frames reach the precheck path only in these states
    pub fn is_recording(&self) -> bool {
        matches!(
            self,
            CaptureState::SelfieRecordActive
                | CaptureState::SelfieRecordPassive
                | CaptureState::IdRecordTilt
                | CaptureState::IdRecordBack
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Done)
    }

    /// Fixed successor for the scripted part of the flow. Review, upload
    /// and retry transitions depend on outcomes and return `None`.
    pub fn scripted_next(&self) -> Option<CaptureState> {
        match self {
            CaptureState::Idle => Some(CaptureState::SelfieGuide),
            CaptureState::SelfieGuide => Some(CaptureState::SelfieRecordActive),
            CaptureState::SelfieRecordActive => Some(CaptureState::SelfieRecordPassive),
            CaptureState::SelfieRecordPassive => Some(CaptureState::IdGuide),
            CaptureState::IdGuide => Some(CaptureState::IdRecordTilt),
            CaptureState::IdRecordTilt => Some(CaptureState::IdRecordBack),
            CaptureState::IdRecordBack => Some(CaptureState::ReviewPrechecks),
            CaptureState::ReviewPrechecks
            | CaptureState::Upload
            | CaptureState::Done
            | CaptureState::Retry => None,
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompted liveness action, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Challenge {
    Blink,
    HeadTurn,
}

impl Challenge {
    /// Uniform pick between the two variants
    pub fn random() -> Self {
        Self::pick(&mut rand::thread_rng())
    }

    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Challenge::Blink
        } else {
            Challenge::HeadTurn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Challenge::Blink => "blink",
            Challenge::HeadTurn => "head_turn",
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
