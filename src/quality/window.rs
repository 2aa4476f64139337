//! Per-frame metrics and the bounded precheck window

use super::face::DetectedFace;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Quality metrics for one analyzed frame. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub sequence: u64,
    pub timestamp_us: u64,
    /// Laplacian variance, higher is sharper
    pub blur: f64,
    /// Mean brightness, 0-255
    pub exposure: f64,
    /// Mean optical-flow magnitude against the previous frame
    pub motion: f64,
    /// Mean block variance
    pub compression: f64,
    pub faces: Vec<DetectedFace>,
}

/// Bounded FIFO of frame metrics in arrival order
#[derive(Debug, Clone)]
pub struct PrecheckWindow {
    entries: VecDeque<FrameMetrics>,
    capacity: usize,
}

impl PrecheckWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append, evicting the oldest entry once at capacity
    pub fn push(&mut self, metrics: FrameMetrics) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(metrics);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameMetrics> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&FrameMetrics> {
        self.entries.back()
    }

    fn mean_of(&self, f: impl Fn(&FrameMetrics) -> f64) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(f).sum::<f64>() / self.entries.len() as f64
    }

    pub fn average_blur(&self) -> f64 {
        self.mean_of(|m| m.blur)
    }

    pub fn average_exposure(&self) -> f64 {
        self.mean_of(|m| m.exposure)
    }

    pub fn average_compression(&self) -> f64 {
        self.mean_of(|m| m.compression)
    }

    pub fn max_motion(&self) -> f64 {
        self.entries.iter().map(|m| m.motion).fold(0.0, f64::max)
    }

    /// Fraction of frames with exactly one detected face
    pub fn single_face_ratio(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let single = self.entries.iter().filter(|m| m.faces.len() == 1).count();
        single as f64 / self.entries.len() as f64
    }

    /// Mean stability over every detected face in the window
    pub fn average_face_stability(&self) -> f64 {
        let (sum, count) = self
            .entries
            .iter()
            .flat_map(|m| m.faces.iter())
            .fold((0.0, 0usize), |(s, n), f| (s + f.stability, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::metrics_sample;
    use proptest::prelude::*;

    #[test]
    fn test_eviction_keeps_newest() {
        let mut window = PrecheckWindow::new(3);
        for seq in 0..5u64 {
            let mut m = metrics_sample(150.0, 100.0, 0.1, 50.0, 1, 0.9);
            m.sequence = seq;
            window.push(m);
        }
        let seqs: Vec<u64> = window.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(window.latest().map(|m| m.sequence), Some(4));
    }

    #[test]
    fn test_aggregates() {
        let mut window = PrecheckWindow::new(10);
        window.push(metrics_sample(100.0, 50.0, 0.5, 10.0, 1, 0.8));
        window.push(metrics_sample(200.0, 150.0, 1.5, 30.0, 0, 0.0));
        assert_eq!(window.average_blur(), 150.0);
        assert_eq!(window.average_exposure(), 100.0);
        assert_eq!(window.max_motion(), 1.5);
        assert_eq!(window.average_compression(), 20.0);
        assert_eq!(window.single_face_ratio(), 0.5);
        assert!((window.average_face_stability() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_empty_window_aggregates_are_zero() {
        let window = PrecheckWindow::new(5);
        assert_eq!(window.average_blur(), 0.0);
        assert_eq!(window.single_face_ratio(), 0.0);
        assert_eq!(window.average_face_stability(), 0.0);
    }

    proptest! {
        #[test]
        fn window_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
            let mut window = PrecheckWindow::new(capacity);
            for _ in 0..pushes {
                window.push(metrics_sample(1.0, 1.0, 0.0, 1.0, 1, 1.0));
                prop_assert!(window.len() <= capacity);
            }
            prop_assert_eq!(window.len(), pushes.min(capacity));
        }
    }
}
