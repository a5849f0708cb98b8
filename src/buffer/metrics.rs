use serde::Serialize;

/// Point-in-time view of the command buffer counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferMetrics {
    pub capacity: usize,
    pub len: usize,
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub peak_len: usize,
    pub memory_usage_bytes: usize,
}

impl BufferMetrics {
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len as f64 / self.capacity as f64
        }
    }
}
