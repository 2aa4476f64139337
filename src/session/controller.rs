//! Async driver around a shared [`CaptureSession`]

use super::{Advance, CaptureSession, CaptureState};
use crate::device::DeviceBindingScorer;
use crate::errors::{FrameError, SessionError};
use crate::quality::FrameMetrics;
use crate::transport::MediaUploader;
use crate::types::CaptureFrame;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Owns the session behind a lock and runs its external calls as tokio
/// tasks. The lock is never held across an await.
pub struct CaptureController {
    session: Arc<Mutex<CaptureSession>>,
    uploader: Arc<dyn MediaUploader>,
    scorer: Option<Arc<DeviceBindingScorer>>,
    upload_task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureController {
    pub fn new(session: CaptureSession, uploader: Arc<dyn MediaUploader>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            uploader,
            scorer: None,
            upload_task: Mutex::new(None),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<DeviceBindingScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn session(&self) -> Arc<Mutex<CaptureSession>> {
        Arc::clone(&self.session)
    }

    pub fn state(&self) -> CaptureState {
        self.session.lock().state()
    }

    /// Advance the session. Entering `UPLOAD` spawns the upload; its
    /// result drives the session to `DONE` or `RETRY` later.
    pub async fn advance(&self) -> Result<CaptureState, SessionError> {
        let outcome = self.session.lock().advance()?;

        if let Advance::UploadStarted(job) = outcome {
            let session = Arc::clone(&self.session);
            let uploader = Arc::clone(&self.uploader);
            let handle = tokio::spawn(async move {
                let result = uploader.upload(job.request).await;
                session.lock().complete_upload(job.generation, result);
            });
            if let Some(previous) = self.upload_task.lock().replace(handle) {
                previous.abort();
            }
        }

        Ok(self.state())
    }

    /// Abandon the attempt; an in-flight upload is aborted
    pub fn retry(&self) -> Result<CaptureState, SessionError> {
        self.session.lock().retry()?;
        if let Some(task) = self.upload_task.lock().take() {
            task.abort();
        }
        Ok(self.state())
    }

    /// Wait for the spawned upload, if any, and return the resulting state
    pub async fn wait_for_upload(&self) -> CaptureState {
        let task = self.upload_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::error!("Upload task failed: {}", e);
                }
            }
        }
        self.state()
    }

    pub fn push_frame(&self, frame: &CaptureFrame) -> Result<Option<FrameMetrics>, FrameError> {
        let inputs = self.session.lock().frame_scorer();
        let (generation, scorer) = match inputs {
            Some(inputs) => inputs,
            None => return Ok(None),
        };
        let scored = scorer.score(frame)?;
        Ok(self.session.lock().commit_frame(generation, scored))
    }

    /// Compute and store the device-binding record for the current
    /// attempt. Returns whether the record was applied.
    pub async fn bind_device(&self, identifier: &str) -> Result<bool, SessionError> {
        let scorer = self.scorer.as_ref().ok_or(SessionError::NoScorer)?;
        let (generation, started_at) = {
            let session = self.session.lock();
            if session.state().is_terminal() {
                return Err(SessionError::Terminal(session.state().as_str()));
            }
            (session.generation(), session.started_at())
        };

        let record = scorer.score(started_at, identifier).await;
        Ok(self.session.lock().record_binding(generation, record))
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(task) = self.upload_task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("state", &self.state())
            .field("has_scorer", &self.scorer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ThresholdStore, WindowConfig};
    use crate::session::Challenge;
    use crate::testing::{metrics_sample, ScriptedDetector};
    use crate::transport::{MediaFile, MediaKind, TransportError, UploadReceipt, UploadRequest};
    use async_trait::async_trait;

    struct Canned(u16);

    #[async_trait]
    impl MediaUploader for Canned {
        async fn upload(&self, _request: UploadRequest) -> Result<UploadReceipt, TransportError> {
            if self.0 < 300 {
                Ok(UploadReceipt {
                    status: self.0,
                    body: "{}".to_string(),
                })
            } else {
                Err(TransportError::Rejected {
                    status: self.0,
                    body: String::new(),
                })
            }
        }
    }

    fn ready_session() -> CaptureSession {
        let mut session = CaptureSession::with_challenge(
            Arc::new(ScriptedDetector::single_face(0.95)),
            Arc::new(ThresholdStore::default()),
            &WindowConfig::default(),
            Challenge::Blink,
        );
        while session.state() != CaptureState::IdRecordBack {
            session.advance().unwrap();
        }
        session
            .attach_media(MediaFile::new(MediaKind::Selfie, "/tmp/selfie.mp4"))
            .unwrap();
        session
            .attach_media(MediaFile::new(MediaKind::Document, "/tmp/id.mp4"))
            .unwrap();
        for _ in 0..15 {
            session
                .precheck_mut()
                .record(metrics_sample(150.0, 100.0, 0.1, 50.0, 1, 0.95));
        }
        session
    }

    #[tokio::test]
    async fn test_successful_upload_reaches_done() {
        let controller = CaptureController::new(ready_session(), Arc::new(Canned(200)));
        assert_eq!(controller.advance().await.unwrap(), CaptureState::ReviewPrechecks);
        assert_eq!(controller.advance().await.unwrap(), CaptureState::Upload);
        assert_eq!(controller.wait_for_upload().await, CaptureState::Done);
    }

    #[tokio::test]
    async fn test_failed_upload_routes_to_retry() {
        let controller = CaptureController::new(ready_session(), Arc::new(Canned(500)));
        controller.advance().await.unwrap();
        controller.advance().await.unwrap();
        assert_eq!(controller.wait_for_upload().await, CaptureState::Retry);
    }

    #[tokio::test]
    async fn test_bind_device_requires_scorer() {
        let controller = CaptureController::new(ready_session(), Arc::new(Canned(200)));
        assert_eq!(
            controller.bind_device("id").await.unwrap_err(),
            SessionError::NoScorer
        );
    }
}
