//! Pass/fail gates over the precheck window

use super::window::PrecheckWindow;
use crate::config::PrecheckThresholds;
use serde::{Deserialize, Serialize};

/// Full gate evaluation: aggregates plus each individual verdict.
///
/// Never shown to the user; logged and optionally exposed in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub samples: usize,
    pub sufficient_samples: bool,
    pub average_blur: f64,
    pub average_exposure: f64,
    pub max_motion: f64,
    pub average_compression: f64,
    pub face_presence_ratio: f64,
    pub average_face_stability: f64,
    pub blur_pass: bool,
    pub exposure_pass: bool,
    pub motion_pass: bool,
    pub compression_pass: bool,
    pub face_presence_pass: bool,
    pub face_stability_pass: bool,
}

impl GateReport {
    /// Blur, exposure, motion and compression gates; fails closed below
    /// the minimum sample count
    pub fn quality_passed(&self) -> bool {
        self.sufficient_samples
            && self.blur_pass
            && self.exposure_pass
            && self.motion_pass
            && self.compression_pass
    }

    /// Face presence ratio and stability; fails on an empty window
    pub fn face_passed(&self) -> bool {
        self.samples > 0 && self.face_presence_pass && self.face_stability_pass
    }

    /// Combined gate used when reviewing prechecks
    pub fn passed(&self) -> bool {
        self.quality_passed() && self.face_passed()
    }
}

/// Evaluate every gate against one threshold snapshot
pub fn evaluate(window: &PrecheckWindow, thresholds: &PrecheckThresholds) -> GateReport {
    let samples = window.len();
    let average_blur = window.average_blur();
    let average_exposure = window.average_exposure();
    let max_motion = window.max_motion();
    let average_compression = window.average_compression();
    let face_presence_ratio = window.single_face_ratio();
    let average_face_stability = window.average_face_stability();

    GateReport {
        samples,
        sufficient_samples: samples >= thresholds.min_samples,
        average_blur,
        average_exposure,
        max_motion,
        average_compression,
        face_presence_ratio,
        average_face_stability,
        blur_pass: average_blur >= thresholds.blur_min,
        exposure_pass: (thresholds.exposure_min..=thresholds.exposure_max)
            .contains(&average_exposure),
        motion_pass: max_motion <= thresholds.motion_max,
        compression_pass: average_compression < thresholds.compression_max,
        face_presence_pass: face_presence_ratio >= thresholds.face_presence_min_ratio,
        face_stability_pass: average_face_stability >= thresholds.face_stability_min,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::FrameMetrics;
    use crate::testing::metrics_sample;
    use proptest::prelude::*;

    fn filled(n: usize, faces: usize) -> PrecheckWindow {
        let mut window = PrecheckWindow::new(120);
        for _ in 0..n {
            window.push(metrics_sample(150.0, 100.0, 0.1, 50.0, faces, 0.95));
        }
        window
    }

    #[test]
    fn test_good_window_passes() {
        let report = evaluate(&filled(15, 1), &PrecheckThresholds::default());
        assert!(report.quality_passed());
        assert!(report.face_passed());
        assert!(report.passed());
    }

    fn window_with(mutate: impl Fn(&mut FrameMetrics)) -> GateReport {
        let mut window = PrecheckWindow::new(120);
        for _ in 0..12 {
            let mut m = metrics_sample(150.0, 100.0, 0.1, 50.0, 1, 0.95);
            mutate(&mut m);
            window.push(m);
        }
        evaluate(&window, &PrecheckThresholds::default())
    }

    #[test]
    fn test_each_gate_can_fail_alone() {
        let blurry = window_with(|m| m.blur = 20.0);
        assert!(!blurry.blur_pass && blurry.exposure_pass && !blurry.passed());

        let overexposed = window_with(|m| m.exposure = 250.0);
        assert!(!overexposed.exposure_pass && overexposed.blur_pass && !overexposed.passed());

        let shaky = window_with(|m| m.motion = 5.0);
        assert!(!shaky.motion_pass && shaky.compression_pass && !shaky.passed());

        let blocky = window_with(|m| m.compression = 150.0);
        assert!(!blocky.compression_pass && blocky.motion_pass && !blocky.passed());
        assert!(blocky.face_passed());
    }

    #[test]
    fn test_single_motion_spike_fails() {
        let mut window = filled(14, 1);
        window.push(metrics_sample(150.0, 100.0, 2.5, 50.0, 1, 0.95));
        assert!(!evaluate(&window, &PrecheckThresholds::default()).motion_pass);
    }

    #[test]
    fn test_two_faces_do_not_count_as_present() {
        let report = evaluate(&filled(15, 2), &PrecheckThresholds::default());
        assert!(report.quality_passed());
        assert_eq!(report.face_presence_ratio, 0.0);
        assert!(!report.passed());
    }

    #[test]
    fn test_low_stability_fails() {
        let mut window = PrecheckWindow::new(120);
        for _ in 0..15 {
            window.push(metrics_sample(150.0, 100.0, 0.1, 50.0, 1, 0.2));
        }
        let report = evaluate(&window, &PrecheckThresholds::default());
        assert!(report.face_presence_pass);
        assert!(!report.face_stability_pass);
    }

    proptest! {
        #[test]
        fn undersized_window_always_fails_closed(
            n in 0usize..10,
            blur in 0.0f64..10_000.0,
            exposure in 0.0f64..255.0,
            motion in 0.0f64..10.0,
            compression in 0.0f64..500.0,
        ) {
            let mut window = PrecheckWindow::new(120);
            for _ in 0..n {
                window.push(metrics_sample(blur, exposure, motion, compression, 1, 1.0));
            }
            let report = evaluate(&window, &PrecheckThresholds::default());
            prop_assert!(!report.quality_passed());
            prop_assert!(!report.passed());
        }
    }
}
