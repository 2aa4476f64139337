//! Capture state machine
//!
//! [`CaptureSession`] is the root aggregate for one enrollment attempt. It
//! owns the precheck aggregator, the recorded media handles and the
//! device-binding record, and moves through [`CaptureState`] one explicit
//! `advance` at a time.
//!
//! Work that outlives a call (the upload, device binding) is stamped with
//! the session generation when it starts. Results are applied only if the
//! generation and state still match, so a late result can never touch an
//! attempt that has already been retried.

pub mod controller;
pub mod state;

use crate::config::{ThresholdStore, WindowConfig};
use crate::device::DeviceBindingRecord;
use crate::errors::{FrameError, SessionError};
use crate::quality::{
    DocumentDetection, DocumentDetector, FaceDetector, FrameMetrics, FrameScorer, GateReport,
    PrecheckAggregator, ScoredFrame,
};
use crate::transport::{MediaFile, MediaKind, TransportError, UploadReceipt, UploadRequest};
use crate::types::CaptureFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub use controller::CaptureController;
pub use state::{CaptureState, Challenge};

/// Final result of the upload for this attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadOutcome {
    Succeeded(UploadReceipt),
    Failed(String),
}

/// Upload work handed out when the session enters `UPLOAD`
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub generation: u64,
    pub request: UploadRequest,
}

/// What a single `advance` did
#[derive(Debug, Clone)]
pub enum Advance {
    Moved {
        from: CaptureState,
        to: CaptureState,
    },
    /// Entered `UPLOAD`; the caller must run the job and report back
    /// through [`CaptureSession::complete_upload`]
    UploadStarted(UploadJob),
    /// Waiting on an external result
    Unchanged(CaptureState),
}

pub struct CaptureSession {
    id: Uuid,
    state: CaptureState,
    challenge: Challenge,
    started_at: DateTime<Utc>,
    generation: u64,
    precheck: PrecheckAggregator,
    selfie: Option<MediaFile>,
    document: Option<MediaFile>,
    document_check: Option<DocumentDetection>,
    device_binding: Option<DeviceBindingRecord>,
    upload_outcome: Option<UploadOutcome>,
    last_report: Option<GateReport>,
    debug_mode: bool,
}

impl CaptureSession {
    /// New session in `IDLE` with a randomly chosen challenge
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        thresholds: Arc<ThresholdStore>,
        window: &WindowConfig,
    ) -> Self {
        Self::with_challenge(detector, thresholds, window, Challenge::random())
    }

    pub fn with_challenge(
        detector: Arc<dyn FaceDetector>,
        thresholds: Arc<ThresholdStore>,
        window: &WindowConfig,
        challenge: Challenge,
    ) -> Self {
        let id = Uuid::new_v4();
        log::info!("Capture session {} created with challenge {}", id, challenge);
        Self {
            id,
            state: CaptureState::Idle,
            challenge,
            started_at: Utc::now(),
            generation: 0,
            precheck: PrecheckAggregator::new(detector, thresholds, window),
            selfie: None,
            document: None,
            document_check: None,
            device_binding: None,
            upload_outcome: None,
            last_report: None,
            debug_mode: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn challenge(&self) -> Challenge {
        self.challenge
    }

    /// The challenge to prompt, only while the active selfie recording runs
    pub fn active_challenge(&self) -> Option<Challenge> {
        (self.state == CaptureState::SelfieRecordActive).then_some(self.challenge)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn precheck(&self) -> &PrecheckAggregator {
        &self.precheck
    }

    pub fn precheck_mut(&mut self) -> &mut PrecheckAggregator {
        &mut self.precheck
    }

    pub fn media(&self, kind: MediaKind) -> Option<&MediaFile> {
        match kind {
            MediaKind::Selfie => self.selfie.as_ref(),
            MediaKind::Document => self.document.as_ref(),
        }
    }

    pub fn document_check(&self) -> Option<&DocumentDetection> {
        self.document_check.as_ref()
    }

    pub fn device_binding(&self) -> Option<&DeviceBindingRecord> {
        self.device_binding.as_ref()
    }

    pub fn upload_outcome(&self) -> Option<&UploadOutcome> {
        self.upload_outcome.as_ref()
    }

    /// Leave `IDLE`
    pub fn start_capture(&mut self) -> Result<Advance, SessionError> {
        if self.state != CaptureState::Idle {
            log::debug!("start_capture ignored in {}", self.state);
            return Ok(Advance::Unchanged(self.state));
        }
        self.advance()
    }

    /// Apply one advance event
    pub fn advance(&mut self) -> Result<Advance, SessionError> {
        match self.state {
            CaptureState::Done => Err(SessionError::Terminal(self.state.as_str())),
            CaptureState::Upload => Ok(Advance::Unchanged(self.state)),
            CaptureState::ReviewPrechecks => Ok(self.review()),
            CaptureState::Retry => {
                self.reset_attempt();
                Ok(self.move_to(CaptureState::SelfieGuide))
            }
            scripted => match scripted.scripted_next() {
                Some(next) => Ok(self.move_to(next)),
                None => Ok(Advance::Unchanged(scripted)),
            },
        }
    }

    /// Abandon the attempt from any non-terminal state
    pub fn retry(&mut self) -> Result<Advance, SessionError> {
        match self.state {
            CaptureState::Done => Err(SessionError::Terminal(self.state.as_str())),
            CaptureState::Retry => Ok(Advance::Unchanged(self.state)),
            _ => Ok(self.move_to(CaptureState::Retry)),
        }
    }

    fn review(&mut self) -> Advance {
        let report = self.precheck.evaluate();
        log::info!(
            "Precheck review: samples {} blur {} exposure {} motion {} compression {} face presence {} face stability {}",
            report.samples,
            report.blur_pass,
            report.exposure_pass,
            report.motion_pass,
            report.compression_pass,
            report.face_presence_pass,
            report.face_stability_pass
        );
        let passed = report.passed();
        self.last_report = Some(report);

        if !passed {
            return self.move_to(CaptureState::Retry);
        }

        let (selfie, document) = match (&self.selfie, &self.document) {
            (Some(s), Some(d)) => (s.clone(), d.clone()),
            _ => {
                log::warn!("Prechecks passed but media is missing, retrying");
                return self.move_to(CaptureState::Retry);
            }
        };

        self.move_to(CaptureState::Upload);
        Advance::UploadStarted(UploadJob {
            generation: self.generation,
            request: UploadRequest {
                session_id: self.id,
                challenge: self.challenge,
                media: vec![selfie, document],
                device_binding: self.device_binding.clone(),
            },
        })
    }

    fn move_to(&mut self, to: CaptureState) -> Advance {
        let from = self.state;
        self.state = to;
        log::info!("Session {}: {} -> {}", self.id, from, to);
        Advance::Moved { from, to }
    }

    /// Clear everything tied to the failed attempt. Thresholds and the
    /// challenge are kept.
    fn reset_attempt(&mut self) {
        self.precheck.reset();
        self.selfie = None;
        self.document = None;
        self.document_check = None;
        self.device_binding = None;
        self.upload_outcome = None;
        self.last_report = None;
        self.started_at = Utc::now();
        self.generation += 1;
        log::debug!("Session {} reset to generation {}", self.id, self.generation);
    }

    /// Feed a camera frame. Outside recording states the frame is ignored.
    pub fn on_frame(&mut self, frame: &CaptureFrame) -> Result<Option<FrameMetrics>, FrameError> {
        if !self.state.is_recording() {
            return Ok(None);
        }
        self.precheck.process_frame(frame).map(Some)
    }

    /// Scoring inputs for the next frame, stamped with the current
    /// generation. `None` outside recording states.
    pub fn frame_scorer(&self) -> Option<(u64, FrameScorer)> {
        self.state
            .is_recording()
            .then(|| (self.generation, self.precheck.scorer()))
    }

    /// Apply a frame scored from [`frame_scorer`](Self::frame_scorer).
    /// Frames scored before a reset, after leaving a recording state, or
    /// against a predecessor that has since moved on are dropped.
    pub fn commit_frame(&mut self, generation: u64, scored: ScoredFrame) -> Option<FrameMetrics> {
        if generation != self.generation || !self.state.is_recording() {
            log::debug!(
                "Ignoring frame {} scored in generation {} (now {} in {})",
                scored.metrics().sequence,
                generation,
                self.generation,
                self.state
            );
            return None;
        }
        let metrics = scored.metrics().clone();
        self.precheck.commit(scored).then_some(metrics)
    }

    /// Record a finished recording. Selfie media is accepted once selfie
    /// recording has begun, document media once ID recording has begun,
    /// and neither after review.
    pub fn attach_media(&mut self, file: MediaFile) -> Result<(), SessionError> {
        use CaptureState::*;
        let allowed = match file.kind {
            MediaKind::Selfie => matches!(
                self.state,
                SelfieRecordActive
                    | SelfieRecordPassive
                    | IdGuide
                    | IdRecordTilt
                    | IdRecordBack
                    | ReviewPrechecks
            ),
            MediaKind::Document => {
                matches!(self.state, IdRecordTilt | IdRecordBack | ReviewPrechecks)
            }
        };
        if !allowed {
            return Err(SessionError::MediaOutOfPhase(self.state.as_str()));
        }
        log::debug!("Attached {} media {}", file.kind, file.path.display());
        match file.kind {
            MediaKind::Selfie => self.selfie = Some(file),
            MediaKind::Document => self.document = Some(file),
        }
        Ok(())
    }

    /// Run the document detector on a candidate frame and keep the result
    pub fn check_document(
        &mut self,
        detector: &DocumentDetector,
        frame: &CaptureFrame,
    ) -> DocumentDetection {
        let detection = detector.detect(frame);
        log::info!("Document check on frame {}: {}", frame.sequence, detection.detected);
        self.document_check = Some(detection.clone());
        detection
    }

    /// Apply the upload result for `generation`. Returns false when the
    /// result is stale and was dropped.
    pub fn complete_upload(
        &mut self,
        generation: u64,
        result: Result<UploadReceipt, TransportError>,
    ) -> bool {
        if generation != self.generation || self.state != CaptureState::Upload {
            log::debug!(
                "Ignoring upload result for generation {} (now {} in {})",
                generation,
                self.generation,
                self.state
            );
            return false;
        }
        match result {
            Ok(receipt) => {
                self.upload_outcome = Some(UploadOutcome::Succeeded(receipt));
                self.move_to(CaptureState::Done);
            }
            Err(e) => {
                log::warn!("Upload failed: {}", e);
                self.upload_outcome = Some(UploadOutcome::Failed(e.to_string()));
                self.move_to(CaptureState::Retry);
            }
        }
        true
    }

    /// Store the binding record computed for `generation`. The record is
    /// written once per attempt; later or stale records are dropped.
    pub fn record_binding(&mut self, generation: u64, record: DeviceBindingRecord) -> bool {
        if generation != self.generation || self.state.is_terminal() {
            log::debug!("Ignoring device binding for generation {}", generation);
            return false;
        }
        if self.device_binding.is_some() {
            log::debug!("Device binding already recorded for generation {}", generation);
            return false;
        }
        self.device_binding = Some(record);
        true
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.debug_mode = enabled;
    }

    pub fn toggle_debug(&mut self) -> bool {
        self.debug_mode = !self.debug_mode;
        self.debug_mode
    }

    /// Raw gate scores, exposed only in debug mode. Returns the last
    /// review report, or a live evaluation before the first review.
    pub fn debug_report(&self) -> Option<GateReport> {
        if !self.debug_mode {
            return None;
        }
        Some(
            self.last_report
                .clone()
                .unwrap_or_else(|| self.precheck.evaluate()),
        )
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("challenge", &self.challenge)
            .field("generation", &self.generation)
            .field("precheck", &self.precheck)
            .finish_non_exhaustive()
    }
}
