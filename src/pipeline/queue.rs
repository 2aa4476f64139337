//! Bounded drop-oldest hand-off queue

use super::PipelineError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bounded queue that evicts the oldest item instead of blocking the
/// producer. With capacity 1 the consumer only ever sees the latest frame.
#[derive(Debug)]
pub struct FrameQueue<T> {
    inner: Mutex<QueueInner<T>>,
    cv: Condvar,
}

#[derive(Debug)]
struct QueueInner<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

impl<T> FrameQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                dropped: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Returns false if the queue is closed and the item was discarded
    pub fn push_drop_oldest(&self, item: T) -> bool {
        let mut g = self.inner.lock();
        if g.closed {
            return false;
        }
        if g.items.len() >= g.capacity {
            g.items.pop_front();
            g.dropped = g.dropped.saturating_add(1);
        }
        g.items.push_back(item);
        self.cv.notify_one();
        true
    }

    /// Wait up to `timeout` for an item. `Ok(None)` on timeout; an error
    /// once the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, PipelineError> {
        let mut g = self.inner.lock();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = g.items.pop_front() {
                return Ok(Some(item));
            }
            if g.closed {
                return Err(PipelineError::Closed);
            }
            if self.cv.wait_until(&mut g, deadline).timed_out() {
                return Ok(g.items.pop_front());
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard anything pending without counting it as dropped
    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }

    pub fn close(&self) {
        let mut g = self.inner.lock();
        g.closed = true;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_latest_only_with_capacity_one() {
        let q = FrameQueue::new(1);
        for i in 0..5 {
            q.push_drop_oldest(i);
        }
        assert_eq!(q.dropped(), 4);
        assert_eq!(q.pop_timeout(Duration::ZERO).unwrap(), Some(4));
        assert_eq!(q.pop_timeout(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn test_closed_queue_drains_then_errors() {
        let q = FrameQueue::new(4);
        q.push_drop_oldest("a");
        q.close();
        assert!(!q.push_drop_oldest("b"));
        assert_eq!(q.pop_timeout(Duration::ZERO).unwrap(), Some("a"));
        assert!(matches!(q.pop_timeout(Duration::ZERO), Err(PipelineError::Closed)));
    }

    #[test]
    fn test_consumer_wakes_on_push() {
        let q = Arc::new(FrameQueue::new(2));
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                q.push_drop_oldest(7u32);
            })
        };
        assert_eq!(q.pop_timeout(Duration::from_secs(5)).unwrap(), Some(7));
        producer.join().unwrap();
    }
}
