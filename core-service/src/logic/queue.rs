//! Detection Queue
//!
//! Bounded FIFO between the watch callback (producer, may run on the watcher's
//! own thread) and the processing loop (single consumer). Producers wait a
//! bounded time for space and then drop; the consumer waits a bounded time for
//! work so it can re-check its shutdown flag.
//!
//! Detections from independent watch threads are ordered by enqueue time, not
//! by the wall-clock time of the underlying filesystem event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::types::Detection;

/// Returned when the queue stayed full for the whole enqueue wait
#[derive(Debug)]
pub struct QueueFull(pub Detection);

pub struct DetectionQueue {
    items: Mutex<VecDeque<Detection>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl DetectionQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue, waiting at most `wait` for space.
    ///
    /// On timeout the detection is handed back and the drop counter is bumped.
    pub fn push(&self, detection: Detection, wait: Duration) -> Result<(), QueueFull> {
        let deadline = Instant::now() + wait;
        let mut items = self.items.lock();

        while items.len() >= self.capacity {
            if self.not_full.wait_until(&mut items, deadline).timed_out() && items.len() >= self.capacity {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                return Err(QueueFull(detection));
            }
        }

        items.push_back(detection);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest detection, waiting at most `wait`.
    ///
    /// May return `None` early when woken by `wake_all`.
    pub fn pop_timeout(&self, wait: Duration) -> Option<Detection> {
        let deadline = Instant::now() + wait;
        let mut items = self.items.lock();

        if items.is_empty() {
            self.not_empty.wait_until(&mut items, deadline);
        }
        let detection = items.pop_front();
        drop(items);

        if detection.is_some() {
            self.not_full.notify_one();
        }
        detection
    }

    /// Wake a consumer blocked in `pop_timeout` (used on shutdown)
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Detections dropped because the queue stayed full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::types::EventKind;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    fn detection(id: &str) -> Detection {
        Detection::new(id, EventKind::Accessed, PathBuf::from("/tmp/decoy"))
    }

    #[test]
    fn test_fifo_order() {
        let queue = DetectionQueue::new(8);
        for id in ["a", "b", "c"] {
            queue.push(detection(id), Duration::ZERO).unwrap();
        }

        let order: Vec<String> = (0..3)
            .filter_map(|_| queue.pop_timeout(Duration::ZERO))
            .map(|d| d.decoy_id)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_after_wait() {
        let queue = DetectionQueue::new(1);
        queue.push(detection("a"), Duration::ZERO).unwrap();

        let start = Instant::now();
        let rejected = queue.push(detection("b"), Duration::from_millis(30));

        assert!(rejected.is_err());
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let queue = DetectionQueue::new(4);
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_blocked_producer_resumes_when_consumer_pops() {
        let queue = Arc::new(DetectionQueue::new(1));
        queue.push(detection("a"), Duration::ZERO).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(detection("b"), Duration::from_secs(5)).is_ok())
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().decoy_id, "a");
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop_timeout(Duration::from_secs(1)).unwrap().decoy_id, "b");
    }

    #[test]
    fn test_multiple_producers_single_consumer() {
        let queue = Arc::new(DetectionQueue::new(64));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..25 {
                        queue.push(detection(&format!("{}-{}", p, i)), Duration::from_secs(5)).unwrap();
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        while received.len() < 100 {
            if let Some(d) = queue.pop_timeout(Duration::from_secs(5)) {
                received.push(d.decoy_id);
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }

        // Per-producer order is preserved
        for p in 0..4 {
            let prefix = format!("{}-", p);
            let seq: Vec<usize> = received
                .iter()
                .filter(|id| id.starts_with(&prefix))
                .map(|id| id[prefix.len()..].parse().unwrap())
                .collect();
            assert_eq!(seq, (0..25).collect::<Vec<_>>());
        }
        assert_eq!(queue.dropped(), 0);
    }
}
