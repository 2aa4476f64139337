//! Clocks for frame timestamps and session time-skew checks

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic clock for frame timestamps
///
/// All frame timestamps in one pipeline derive from this single source
/// so arrival order and timestamp order agree.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Arc<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Microseconds elapsed since clock creation
    #[inline]
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock source trusted for session time-skew checks
pub trait ReferenceClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ReferenceClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl ReferenceClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_is_monotonic() {
        let clock = FrameClock::new();
        let a = clock.now_us();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now_us() > a);
    }

    #[test]
    fn test_fixed_clock() {
        let at = Utc::now();
        assert_eq!(FixedClock(at).now(), at);
    }
}
