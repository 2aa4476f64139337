//! Precheck aggregator: scores frames and owns the rolling window

use super::blur::laplacian_variance;
use super::compression::mean_block_variance;
use super::exposure::mean_value;
use super::face::{detect_faces, FaceDetector};
use super::motion::{score_against, MotionEstimator};
use super::validator::{evaluate, GateReport};
use super::window::{FrameMetrics, PrecheckWindow};
use crate::config::{ThresholdStore, WindowConfig};
use crate::errors::FrameError;
use crate::types::CaptureFrame;
use image::GrayImage;
use std::sync::Arc;

/// Everything needed to score one frame, detached from the aggregator so
/// the kernels and the detector call can run without holding the lock
/// that guards the session.
pub struct FrameScorer {
    detector: Arc<dyn FaceDetector>,
    block_size: u32,
    previous: Option<Arc<GrayImage>>,
}

/// Metrics for one frame plus its luma plane, the next motion predecessor
pub struct ScoredFrame {
    metrics: FrameMetrics,
    gray: Arc<GrayImage>,
    previous: Option<Arc<GrayImage>>,
}

impl ScoredFrame {
    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }
}

impl FrameScorer {
    /// Score `frame` against the predecessor captured with this scorer.
    /// A malformed frame is rejected.
    pub fn score(&self, frame: &CaptureFrame) -> Result<ScoredFrame, FrameError> {
        frame.validate()?;

        let gray = frame.to_gray();
        let blur = laplacian_variance(&gray);
        let exposure = mean_value(frame);
        let compression = mean_block_variance(&gray, self.block_size);
        let faces = detect_faces(self.detector.as_ref(), frame);
        let motion = score_against(self.previous.as_deref(), &gray);

        let metrics = FrameMetrics {
            sequence: frame.sequence,
            timestamp_us: frame.timestamp_us,
            blur,
            exposure,
            motion,
            compression,
            faces,
        };

        log::debug!(
            "Frame {}: blur {:.1} exposure {:.1} motion {:.3} compression {:.1} faces {}",
            metrics.sequence,
            metrics.blur,
            metrics.exposure,
            metrics.motion,
            metrics.compression,
            metrics.faces.len()
        );

        Ok(ScoredFrame {
            metrics,
            gray: Arc::new(gray),
            previous: self.previous.clone(),
        })
    }
}

/// Turns incoming frames into [`FrameMetrics`] and evaluates gates over
/// the accumulated window.
///
/// The detector is created once by the caller and shared by reference.
/// Thresholds are read from the store at evaluation time, so a published
/// update applies to the next decision without touching the window.
pub struct PrecheckAggregator {
    detector: Arc<dyn FaceDetector>,
    thresholds: Arc<ThresholdStore>,
    window: PrecheckWindow,
    motion: MotionEstimator,
    block_size: u32,
}

impl PrecheckAggregator {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        thresholds: Arc<ThresholdStore>,
        config: &WindowConfig,
    ) -> Self {
        if thresholds.window_capacity() > config.capacity {
            log::warn!(
                "Threshold store allows min_samples up to {} but the window holds {}",
                thresholds.window_capacity(),
                config.capacity
            );
        }
        Self {
            detector,
            thresholds,
            window: PrecheckWindow::new(config.capacity),
            motion: MotionEstimator::new(),
            block_size: config.block_size.max(1),
        }
    }

    /// Score one frame and append it to the window.
    ///
    /// A malformed frame is rejected before touching the window or the
    /// motion predecessor.
    pub fn process_frame(&mut self, frame: &CaptureFrame) -> Result<FrameMetrics, FrameError> {
        let scored = self.scorer().score(frame)?;
        let metrics = scored.metrics.clone();
        self.commit(scored);
        Ok(metrics)
    }

    pub fn scorer(&self) -> FrameScorer {
        FrameScorer {
            detector: Arc::clone(&self.detector),
            block_size: self.block_size,
            previous: self.motion.predecessor(),
        }
    }

    /// Append a frame scored by [`scorer`](Self::scorer). Returns false and
    /// drops the frame when another frame was committed or the window was
    /// reset since the scorer was taken.
    pub fn commit(&mut self, scored: ScoredFrame) -> bool {
        let current = self.motion.predecessor();
        let unchanged = match (&scored.previous, &current) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            log::debug!("Dropping stale frame {}", scored.metrics.sequence);
            return false;
        }
        self.motion.retain(scored.gray);
        self.window.push(scored.metrics);
        true
    }

    /// Append externally computed metrics
    pub fn record(&mut self, metrics: FrameMetrics) {
        self.window.push(metrics);
    }

    pub fn evaluate(&self) -> GateReport {
        let thresholds = self.thresholds.snapshot();
        let report = evaluate(&self.window, &thresholds);
        log::debug!(
            "Precheck gates over {} samples: quality {} face {}",
            report.samples,
            report.quality_passed(),
            report.face_passed()
        );
        report
    }

    pub fn check_quality_gates(&self) -> bool {
        self.evaluate().quality_passed()
    }

    pub fn check_face_presence(&self) -> bool {
        self.evaluate().face_passed()
    }

    /// Drop every sample and the motion predecessor. Thresholds are kept.
    pub fn reset(&mut self) {
        self.window.clear();
        self.motion.reset();
    }

    pub fn window(&self) -> &PrecheckWindow {
        &self.window
    }

    pub fn thresholds(&self) -> &Arc<ThresholdStore> {
        &self.thresholds
    }

    pub fn detector(&self) -> &Arc<dyn FaceDetector> {
        &self.detector
    }
}

impl std::fmt::Debug for PrecheckAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecheckAggregator")
            .field("samples", &self.window.len())
            .field("capacity", &self.window.capacity())
            .field("block_size", &self.block_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{checkerboard_frame, metrics_sample, uniform_frame, ScriptedDetector};

    fn aggregator(detector: ScriptedDetector) -> PrecheckAggregator {
        PrecheckAggregator::new(
            Arc::new(detector),
            Arc::new(ThresholdStore::default()),
            &WindowConfig::default(),
        )
    }

    #[test]
    fn test_process_frame_records_metrics() {
        let mut agg = aggregator(ScriptedDetector::single_face(0.95));
        let frame = checkerboard_frame(64, 64, 8).with_timing(7, 1_000);
        let metrics = agg.process_frame(&frame).unwrap();

        assert_eq!(metrics.sequence, 7);
        assert_eq!(metrics.motion, 0.0);
        assert_eq!(metrics.faces.len(), 1);
        assert!(metrics.blur > 100.0);
        assert_eq!(agg.window().len(), 1);
    }

    #[test]
    fn test_detached_score_commits_like_process_frame() {
        let mut agg = aggregator(ScriptedDetector::single_face(0.95));
        let frame = checkerboard_frame(64, 64, 8);

        let scored = agg.scorer().score(&frame).unwrap();
        assert!(agg.window().is_empty());
        assert!(agg.commit(scored));

        let second = agg.scorer().score(&frame).unwrap();
        assert!(second.metrics().motion < 0.01);
        assert!(agg.commit(second));
        assert_eq!(agg.window().len(), 2);
    }

    #[test]
    fn test_commit_after_newer_frame_is_stale() {
        let mut agg = aggregator(ScriptedDetector::single_face(0.95));
        let frame = checkerboard_frame(64, 64, 8);
        agg.process_frame(&frame).unwrap();

        let late = agg.scorer().score(&frame).unwrap();
        agg.process_frame(&frame).unwrap();
        assert!(!agg.commit(late));
        assert_eq!(agg.window().len(), 2);
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let mut agg = aggregator(ScriptedDetector::no_faces());
        let frame = CaptureFrame::new(vec![0; 10], 4, 4);
        assert!(matches!(
            agg.process_frame(&frame),
            Err(FrameError::BufferMismatch { .. })
        ));
        assert!(agg.window().is_empty());
    }

    #[test]
    fn test_threshold_update_applies_to_next_evaluation() {
        let mut agg = aggregator(ScriptedDetector::no_faces());
        for _ in 0..12 {
            agg.record(metrics_sample(150.0, 100.0, 0.1, 50.0, 1, 0.95));
        }
        assert!(agg.check_quality_gates());

        agg.thresholds()
            .update(|t| t.blur_min = 200.0)
            .unwrap();
        assert!(!agg.check_quality_gates());
        assert!(agg.check_face_presence());
    }

    #[test]
    fn test_reset_clears_window_and_motion() {
        let mut agg = aggregator(ScriptedDetector::single_face(0.9));
        agg.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        agg.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        agg.reset();

        assert!(agg.window().is_empty());
        let after = agg.process_frame(&checkerboard_frame(32, 32, 4)).unwrap();
        assert_eq!(after.motion, 0.0);
        assert_eq!(agg.thresholds().snapshot().blur_min, 100.0);
    }
}
