//! Worker thread feeding camera frames into the session

use super::queue::FrameQueue;
use super::PipelineError;
use crate::session::CaptureSession;
use crate::timing::FrameClock;
use crate::types::CaptureFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Camera-side handle. Stamps each frame with a sequence number and a
/// pipeline timestamp, then hands it off without blocking.
#[derive(Debug, Clone)]
pub struct FrameSink {
    queue: Arc<FrameQueue<CaptureFrame>>,
    clock: FrameClock,
    next_sequence: Arc<AtomicU64>,
}

impl FrameSink {
    /// Returns false once the pump has stopped
    pub fn push(&self, mut frame: CaptureFrame) -> bool {
        frame.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        frame.timestamp_us = self.clock.now_us();
        self.queue.push_drop_oldest(frame)
    }
}

#[derive(Debug, Default)]
struct PumpStats {
    processed: AtomicU64,
    ignored: AtomicU64,
    rejected: AtomicU64,
}

/// Latest-frame-only pump between the camera callback and the precheck
/// path. Frames that arrive while scoring is busy replace the pending one.
pub struct FramePump {
    queue: Arc<FrameQueue<CaptureFrame>>,
    clock: FrameClock,
    next_sequence: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<PumpStats>,
    worker: Option<JoinHandle<()>>,
}

impl FramePump {
    pub fn start(session: Arc<Mutex<CaptureSession>>, capacity: usize) -> Result<Self, PipelineError> {
        let queue = Arc::new(FrameQueue::new(capacity));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PumpStats::default());

        let worker = {
            let queue = Arc::clone(&queue);
            let stop_flag = Arc::clone(&stop_flag);
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name("crabkyc-frame-pump".to_string())
                .spawn(move || pump_loop(session, queue, stop_flag, stats))
                .map_err(PipelineError::Spawn)?
        };

        Ok(Self {
            queue,
            clock: FrameClock::new(),
            next_sequence: Arc::new(AtomicU64::new(0)),
            stop_flag,
            stats,
            worker: Some(worker),
        })
    }

    pub fn sink(&self) -> FrameSink {
        FrameSink {
            queue: Arc::clone(&self.queue),
            clock: self.clock.clone(),
            next_sequence: Arc::clone(&self.next_sequence),
        }
    }

    /// Frames replaced before the worker got to them
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Frames scored into the precheck window
    pub fn processed(&self) -> u64 {
        self.stats.processed.load(Ordering::Relaxed)
    }

    /// Frames discarded because no recording state was active
    pub fn ignored(&self) -> u64 {
        self.stats.ignored.load(Ordering::Relaxed)
    }

    /// Malformed frames
    pub fn rejected(&self) -> u64 {
        self.stats.rejected.load(Ordering::Relaxed)
    }

    /// Stop the worker and wait for it, at most `join_timeout`.
    /// On timeout the handle is kept so a later call can retry.
    pub fn stop(&mut self, join_timeout: Duration) -> Result<(), PipelineError> {
        let handle = self.worker.take().ok_or(PipelineError::AlreadyStopped)?;
        self.stop_flag.store(true, Ordering::Relaxed);
        self.queue.close();

        let start = Instant::now();
        while !handle.is_finished() {
            if start.elapsed() >= join_timeout {
                self.worker = Some(handle);
                return Err(PipelineError::JoinTimeout(join_timeout));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            log::error!("Frame pump worker panicked");
        }
        log::debug!(
            "Frame pump stopped: processed {} ignored {} rejected {} dropped {}",
            self.processed(),
            self.ignored(),
            self.rejected(),
            self.dropped()
        );
        Ok(())
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop(Duration::from_secs(1)) {
                log::warn!("Frame pump did not stop cleanly: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for FramePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePump")
            .field("running", &self.worker.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn pump_loop(
    session: Arc<Mutex<CaptureSession>>,
    queue: Arc<FrameQueue<CaptureFrame>>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<PumpStats>,
) {
    while !stop_flag.load(Ordering::Relaxed) {
        let frame = match queue.pop_timeout(POLL_INTERVAL) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(_) => break,
        };

        // State is re-read per frame so leaving a recording state stops
        // forwarding immediately. Scoring runs without the session lock.
        let inputs = session.lock().frame_scorer();
        let (generation, scorer) = match inputs {
            Some(inputs) => inputs,
            None => {
                stats.ignored.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        let scored = match scorer.score(&frame) {
            Ok(scored) => scored,
            Err(e) => {
                log::warn!("Dropping frame {}: {}", frame.sequence, e);
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        if session.lock().commit_frame(generation, scored).is_some() {
            stats.processed.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.ignored.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ThresholdStore, WindowConfig};
    use crate::quality::{DetectorError, FaceDetector, FaceObservation};
    use crate::session::{CaptureState, Challenge};
    use crate::testing::{uniform_frame, ScriptedDetector};
    use std::sync::mpsc;

    fn shared_session() -> Arc<Mutex<CaptureSession>> {
        Arc::new(Mutex::new(CaptureSession::with_challenge(
            Arc::new(ScriptedDetector::single_face(0.9)),
            Arc::new(ThresholdStore::default()),
            &WindowConfig::default(),
            Challenge::Blink,
        )))
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let start = Instant::now();
        while !done() && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_frames_ignored_until_recording() {
        let session = shared_session();
        let mut pump = FramePump::start(Arc::clone(&session), 1).unwrap();
        let sink = pump.sink();

        sink.push(uniform_frame(16, 16, 80));
        wait_until(|| pump.ignored() == 1);
        assert!(session.lock().precheck().window().is_empty());

        {
            let mut s = session.lock();
            while s.state() != CaptureState::SelfieRecordActive {
                s.advance().unwrap();
            }
        }
        sink.push(uniform_frame(16, 16, 80));
        wait_until(|| pump.processed() == 1);
        assert_eq!(session.lock().precheck().window().len(), 1);

        pump.stop(Duration::from_secs(2)).unwrap();
        assert!(!sink.push(uniform_frame(16, 16, 80)));
    }

    /// Reports entry, then holds the frame until released
    struct HeldDetector {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl FaceDetector for HeldDetector {
        fn detect(&self, _frame: &CaptureFrame) -> Result<Vec<FaceObservation>, DetectorError> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_session_lock_is_free_while_scoring() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let detector = HeldDetector {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let session = Arc::new(Mutex::new(CaptureSession::with_challenge(
            Arc::new(detector),
            Arc::new(ThresholdStore::default()),
            &WindowConfig::default(),
            Challenge::Blink,
        )));
        {
            let mut s = session.lock();
            while s.state() != CaptureState::SelfieRecordActive {
                s.advance().unwrap();
            }
        }

        let mut pump = FramePump::start(Arc::clone(&session), 1).unwrap();
        pump.sink().push(uniform_frame(16, 16, 80));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(session.try_lock().is_some());
        release_tx.send(()).unwrap();
        wait_until(|| pump.processed() == 1);
        assert_eq!(session.lock().precheck().window().len(), 1);

        pump.stop(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_stop_twice_errors() {
        let mut pump = FramePump::start(shared_session(), 1).unwrap();
        pump.stop(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            pump.stop(Duration::from_secs(2)),
            Err(PipelineError::AlreadyStopped)
        ));
    }

    #[test]
    fn test_sink_stamps_sequence_and_time() {
        let queue = Arc::new(FrameQueue::new(8));
        let sink = FrameSink {
            queue: Arc::clone(&queue),
            clock: FrameClock::new(),
            next_sequence: Arc::new(AtomicU64::new(0)),
        };
        for _ in 0..3 {
            sink.push(uniform_frame(8, 8, 10));
        }
        let frames: Vec<CaptureFrame> = (0..3)
            .filter_map(|_| queue.pop_timeout(Duration::ZERO).unwrap())
            .collect();
        let seqs: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(frames.windows(2).all(|w| w[0].timestamp_us <= w[1].timestamp_us));
    }
}
