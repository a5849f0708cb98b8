use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Down,
    Up,
}

#[derive(Debug)]
struct TrackerState {
    state: ConnectionState,
    last_checked_at: Option<Instant>,
    last_transition_at: Instant,
    consecutive_failures: u32,
}

/// Advisory liveness state of the ingestion socket.
///
/// The lock is never held across I/O, so `can_send` answers immediately
/// even while a probe or a write is in progress.
#[derive(Debug)]
pub struct ConnectionTracker {
    inner: Mutex<TrackerState>,
    check_period: Duration,
    max_pending_writes: usize,
    pending_writes: AtomicUsize,
}

impl ConnectionTracker {
    pub fn new(check_period: Duration, max_pending_writes: usize, initial: ConnectionState) -> Self {
        Self {
            inner: Mutex::new(TrackerState {
                state: initial,
                last_checked_at: None,
                last_transition_at: Instant::now(),
                consecutive_failures: 0,
            }),
            check_period,
            max_pending_writes,
            pending_writes: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_up(&self) -> bool {
        self.state() == ConnectionState::Up
    }

    /// `UP` and the socket write path is not saturated.
    pub fn can_send(&self) -> bool {
        self.is_up() && self.pending_writes.load(Ordering::Acquire) < self.max_pending_writes
    }

    /// Record a successful write or probe. Returns `true` on a `DOWN -> UP` transition.
    pub fn mark_up(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_checked_at = Some(now);
        inner.consecutive_failures = 0;
        if inner.state == ConnectionState::Up {
            return false;
        }

        info!(
            "Ingestion connection is UP (was down for {:?})",
            now.duration_since(inner.last_transition_at)
        );
        inner.state = ConnectionState::Up;
        inner.last_transition_at = now;
        true
    }

    /// Record a failed write or probe. Returns `true` on an `UP -> DOWN` transition.
    pub fn mark_down(&self, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_checked_at = Some(now);
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.state == ConnectionState::Down {
            return false;
        }

        info!("Ingestion connection is DOWN: {}", reason);
        inner.state = ConnectionState::Down;
        inner.last_transition_at = now;
        true
    }

    /// A check is due when none ran in the last `check_period`.
    pub fn is_check_due(&self) -> bool {
        match self.inner.lock().last_checked_at {
            Some(at) => at.elapsed() >= self.check_period,
            None => true,
        }
    }

    pub fn last_checked_at(&self) -> Option<Instant> {
        self.inner.lock().last_checked_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn check_period(&self) -> Duration {
        self.check_period
    }

    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::Acquire)
    }

    /// Count a write as in flight until the guard drops.
    pub fn begin_write(&self) -> PendingWrite<'_> {
        self.pending_writes.fetch_add(1, Ordering::AcqRel);
        PendingWrite {
            counter: &self.pending_writes,
        }
    }
}

#[must_use]
pub struct PendingWrite<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_report_edges_only() {
        let tracker = ConnectionTracker::new(Duration::from_secs(1), 8, ConnectionState::Down);
        assert!(!tracker.can_send());

        assert!(tracker.mark_up());
        assert!(!tracker.mark_up());
        assert!(tracker.can_send());

        assert!(tracker.mark_down("write failed"));
        assert!(!tracker.mark_down("write failed"));
        assert_eq!(tracker.state(), ConnectionState::Down);
        assert_eq!(tracker.consecutive_failures(), 2);
    }

    #[test]
    fn test_saturated_writes_block_can_send() {
        let tracker = ConnectionTracker::new(Duration::from_secs(1), 2, ConnectionState::Up);
        let first = tracker.begin_write();
        assert!(tracker.can_send());
        let second = tracker.begin_write();
        assert!(!tracker.can_send());
        assert_eq!(tracker.pending_writes(), 2);

        drop(first);
        drop(second);
        assert!(tracker.can_send());
        assert_eq!(tracker.pending_writes(), 0);
    }

    #[test]
    fn test_check_due_respects_period() {
        let tracker = ConnectionTracker::new(Duration::from_secs(3600), 8, ConnectionState::Down);
        assert!(tracker.is_check_due());

        tracker.mark_up();
        assert!(!tracker.is_check_due());

        let eager = ConnectionTracker::new(Duration::ZERO, 8, ConnectionState::Up);
        eager.mark_up();
        assert!(eager.is_check_due());
    }
}
