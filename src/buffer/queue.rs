use super::error::BufferError;
use super::metrics::BufferMetrics;
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::warn;

// Prevent excessive memory allocation
const MAX_CAPACITY: usize = 10_000_000;

/// What happens when a line arrives at a full buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered line to make room, with a warning.
    #[default]
    DropOldest,
    /// Keep the buffer as is and refuse the new line.
    RejectNewest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the returned line.
    QueuedAfterDrop(String),
}

#[derive(Debug, Default)]
struct Lines {
    queue: VecDeque<String>,
    bytes: usize,
}

impl Lines {
    fn push_back(&mut self, line: String) {
        self.bytes += line.len();
        self.queue.push_back(line);
    }

    fn push_front(&mut self, line: String) {
        self.bytes += line.len();
        self.queue.push_front(line);
    }

    fn pop_front(&mut self) -> Option<String> {
        let line = self.queue.pop_front()?;
        self.bytes -= line.len();
        Some(line)
    }

    fn pop_back(&mut self) -> Option<String> {
        let line = self.queue.pop_back()?;
        self.bytes -= line.len();
        Some(line)
    }
}

/// Bounded FIFO of composed command lines awaiting delivery.
///
/// Appends are memory-only and never wait on the network, so callers can
/// buffer while the connection is down without blocking.
#[derive(Debug)]
pub struct CommandBuffer {
    lines: Mutex<Lines>,
    capacity: usize,
    policy: OverflowPolicy,
    pushed: AtomicU64,
    popped: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    peak_len: AtomicUsize,
}

impl CommandBuffer {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, BufferError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        Ok(Self {
            lines: Mutex::new(Lines::default()),
            capacity,
            policy,
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            peak_len: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lines.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append a line at the tail, applying the overflow policy when full.
    pub fn push(&self, line: String) -> Result<PushOutcome, BufferError> {
        let mut lines = self.lines.lock();

        let evicted = if lines.queue.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::RejectNewest => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Command buffer full ({} lines), rejecting newest command",
                        self.capacity
                    );
                    return Err(BufferError::BufferFull {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::DropOldest => {
                    let evicted = lines.pop_front();
                    if evicted.is_some() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "Command buffer full ({} lines), dropped oldest command",
                            self.capacity
                        );
                    }
                    evicted
                }
            }
        } else {
            None
        };

        lines.push_back(line);
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.peak_len.fetch_max(lines.queue.len(), Ordering::Relaxed);

        Ok(match evicted {
            Some(line) => PushOutcome::QueuedAfterDrop(line),
            None => PushOutcome::Queued,
        })
    }

    /// Put a line back at the head after a failed delivery attempt.
    ///
    /// If that overfills the buffer the policy picks the victim: the oldest
    /// line under `DropOldest`, the newest under `RejectNewest`.
    pub fn requeue_front(&self, line: String) {
        let mut lines = self.lines.lock();
        lines.push_front(line);

        while lines.queue.len() > self.capacity {
            let victim = match self.policy {
                OverflowPolicy::DropOldest => lines.pop_front(),
                OverflowPolicy::RejectNewest => lines.pop_back(),
            };
            if victim.is_none() {
                break;
            }
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Command buffer over capacity on requeue, dropped one command");
        }
    }

    pub fn pop_front(&self) -> Option<String> {
        let line = self.lines.lock().pop_front();
        if line.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        line
    }

    /// Remove and return every buffered line in FIFO order.
    pub fn take_all(&self) -> Vec<String> {
        let mut lines = self.lines.lock();
        let taken: Vec<String> = lines.queue.drain(..).collect();
        lines.bytes = 0;
        self.popped.fetch_add(taken.len() as u64, Ordering::Relaxed);
        taken
    }

    pub fn metrics(&self) -> BufferMetrics {
        let (len, bytes) = {
            let lines = self.lines.lock();
            (lines.queue.len(), lines.bytes)
        };

        BufferMetrics {
            capacity: self.capacity,
            len,
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            peak_len: self.peak_len.load(Ordering::Relaxed),
            memory_usage_bytes: bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn line(i: usize) -> String {
        format!("series e:e{i} m:m=1.0\n")
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(
            CommandBuffer::new(0, OverflowPolicy::DropOldest).unwrap_err(),
            BufferError::InvalidCapacity { capacity: 0 }
        );
        assert!(CommandBuffer::new(MAX_CAPACITY + 1, OverflowPolicy::DropOldest).is_err());
    }

    #[test]
    fn test_fifo_order() {
        let buffer = CommandBuffer::new(10, OverflowPolicy::DropOldest).unwrap();
        for i in 0..3 {
            buffer.push(line(i)).unwrap();
        }

        assert_eq!(buffer.pop_front(), Some(line(0)));
        assert_eq!(buffer.take_all(), vec![line(1), line(2)]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let buffer = CommandBuffer::new(2, OverflowPolicy::DropOldest).unwrap();
        buffer.push(line(0)).unwrap();
        buffer.push(line(1)).unwrap();

        let outcome = buffer.push(line(2)).unwrap();
        assert_eq!(outcome, PushOutcome::QueuedAfterDrop(line(0)));
        assert_eq!(buffer.take_all(), vec![line(1), line(2)]);

        let metrics = buffer.metrics();
        assert_eq!(metrics.dropped, 1);
        assert_eq!(metrics.pushed, 3);
        assert_eq!(metrics.rejected, 0);
    }

    #[test]
    fn test_reject_newest_when_full() {
        let buffer = CommandBuffer::new(2, OverflowPolicy::RejectNewest).unwrap();
        buffer.push(line(0)).unwrap();
        buffer.push(line(1)).unwrap();

        assert_eq!(
            buffer.push(line(2)).unwrap_err(),
            BufferError::BufferFull { capacity: 2 }
        );
        assert_eq!(buffer.take_all(), vec![line(0), line(1)]);
        assert_eq!(buffer.metrics().rejected, 1);
    }

    #[test]
    fn test_requeue_front_restores_head() {
        let buffer = CommandBuffer::new(4, OverflowPolicy::DropOldest).unwrap();
        buffer.push(line(0)).unwrap();
        buffer.push(line(1)).unwrap();

        let head = buffer.pop_front().unwrap();
        buffer.requeue_front(head);
        assert_eq!(buffer.take_all(), vec![line(0), line(1)]);
    }

    #[test]
    fn test_requeue_over_capacity_follows_policy() {
        let oldest_first = CommandBuffer::new(2, OverflowPolicy::DropOldest).unwrap();
        oldest_first.push(line(1)).unwrap();
        oldest_first.push(line(2)).unwrap();
        oldest_first.requeue_front(line(0));
        assert_eq!(oldest_first.take_all(), vec![line(1), line(2)]);

        let newest_first = CommandBuffer::new(2, OverflowPolicy::RejectNewest).unwrap();
        newest_first.push(line(1)).unwrap();
        newest_first.push(line(2)).unwrap();
        newest_first.requeue_front(line(0));
        assert_eq!(newest_first.take_all(), vec![line(0), line(1)]);
    }

    #[test]
    fn test_metrics_track_bytes_and_peak() {
        let buffer = CommandBuffer::new(10, OverflowPolicy::DropOldest).unwrap();
        buffer.push("abc\n".to_string()).unwrap();
        buffer.push("de\n".to_string()).unwrap();
        buffer.pop_front();

        let metrics = buffer.metrics();
        assert_eq!(metrics.len, 1);
        assert_eq!(metrics.memory_usage_bytes, 3);
        assert_eq!(metrics.peak_len, 2);
        assert_eq!(metrics.popped, 1);
        assert!((metrics.fill_ratio() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_pushes_are_all_counted() {
        let buffer = Arc::new(CommandBuffer::new(100_000, OverflowPolicy::DropOldest).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for i in 0..1000 {
                        buffer.push(line(t * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().is_ok());
        }

        assert_eq!(buffer.len(), 8000);
        assert_eq!(buffer.metrics().pushed, 8000);
    }
}
