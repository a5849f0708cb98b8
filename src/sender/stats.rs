// Lock-free sender statistics using atomic operations

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct AtomicSenderStats {
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    buffered: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    drained: AtomicU64,
    write_failures: AtomicU64,
    probes: AtomicU64,
    reconnects: AtomicU64,
    last_write_time: AtomicU64,
}

impl AtomicSenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_write_time.store(now, Ordering::Relaxed);
    }

    pub fn record_drained(&self, lines: usize) {
        self.drained.fetch_add(lines as u64, Ordering::Relaxed);
    }

    pub fn record_buffered(&self) {
        self.buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(&self) {
        self.probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SenderStats {
        SenderStats {
            sent: self.sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_write_time: self.last_write_time.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sender counters.
///
/// `sent` counts lines written directly by `send`; lines delivered from the
/// buffer are counted in `drained`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStats {
    pub sent: u64,
    pub bytes_sent: u64,
    pub buffered: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub drained: u64,
    pub write_failures: u64,
    pub probes: u64,
    pub reconnects: u64,
    /// Unix millis of the last successful write, 0 if none.
    pub last_write_time: u64,
}
