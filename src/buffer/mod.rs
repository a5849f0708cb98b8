pub mod error;
pub mod metrics;
pub mod queue;

pub use error::BufferError;
pub use metrics::BufferMetrics;
pub use queue::{CommandBuffer, OverflowPolicy, PushOutcome};
