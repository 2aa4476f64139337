//! Sliding-window request limiter shared across sessions

use crate::config::DeviceConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Per-identifier request history over a trailing window.
///
/// One instance is created by the host and handed to every session that
/// should share limits; tests build isolated instances. The whole
/// prune-append-count sequence runs under a single lock. Identifiers
/// whose history has aged out are swept at most once per window.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    state: Mutex<LimiterState>,
    max_requests: usize,
    window: Duration,
}

#[derive(Debug, Default)]
struct LimiterState {
    history: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState::default()),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.max_requests_per_window, config.rate_window())
    }

    /// Record a request for `identifier` now and report whether it is
    /// within the limit
    pub fn check(&self, identifier: &str) -> bool {
        self.check_at(identifier, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit timestamp. Every
    /// call is recorded, including rejected ones.
    pub fn check_at(&self, identifier: &str, now: Instant) -> bool {
        let mut state = self.state.lock();

        let sweep_due = state
            .last_sweep
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if sweep_due {
            let evicted = sweep(&mut state.history, now, self.window);
            if evicted > 0 {
                log::debug!("Evicted {} idle rate-limit identifiers", evicted);
            }
            state.last_sweep = Some(now);
        }

        let entries = state.history.entry(identifier.to_string()).or_default();
        while let Some(&oldest) = entries.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }
        entries.push_back(now);

        let allowed = entries.len() <= self.max_requests;
        if !allowed {
            log::warn!(
                "Rate limit exceeded for {}: {} requests in {:?}",
                identifier,
                entries.len(),
                self.window
            );
        }
        allowed
    }

    /// Requests currently held for `identifier`, without recording one
    pub fn count(&self, identifier: &str) -> usize {
        self.state
            .lock()
            .history
            .get(identifier)
            .map_or(0, VecDeque::len)
    }

    /// Number of identifiers with retained history
    pub fn tracked(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Drop identifiers whose whole history has aged out
    pub fn prune_idle(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        state.last_sweep = Some(now);
        sweep(&mut state.history, now, self.window)
    }
}

fn sweep(history: &mut HashMap<String, VecDeque<Instant>>, now: Instant, window: Duration) -> usize {
    let before = history.len();
    history.retain(|_, entries| {
        entries
            .back()
            .map_or(false, |&last| now.saturating_duration_since(last) < window)
    });
    before - history.len()
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}
