//! Delivery of composed command lines.
//!
//! - `PlainCommandSender`: streams lines over the plain-text ingestion port,
//!   buffering while the connection is down
//! - `ConnectionTracker`: advisory UP/DOWN state with probe scheduling
//! - `BatchDispatcher`: ordered multi-command sends with optional fail-fast
//! - `HttpCommandClient`: request/response delivery over the HTTP API

pub mod batch;
pub mod http;
pub mod plain;
pub mod stats;
pub mod tracker;
pub mod transport;

pub use batch::{BatchDispatcher, BatchReport};
pub use http::{HttpCommandClient, HttpConfig, HttpError, RequestStats};
pub use plain::{DrainReport, PlainCommandSender, SendOutcome, SenderConfig, SenderError};
pub use stats::{AtomicSenderStats, SenderStats};
pub use tracker::{ConnectionState, ConnectionTracker, PendingWrite};
pub use transport::{TcpConfig, TcpTransport, Transport, TransportError};
