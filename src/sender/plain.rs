use super::stats::{AtomicSenderStats, SenderStats};
use super::tracker::{ConnectionState, ConnectionTracker};
use super::transport::{TcpTransport, Transport, TransportError};
use crate::buffer::{BufferError, BufferMetrics, CommandBuffer, OverflowPolicy, PushOutcome};
use crate::domain::Command;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Initial connection to {endpoint} failed: {source}")]
    InitialConnect {
        endpoint: String,
        #[source]
        source: TransportError,
    },
    #[error("Invalid sender configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No Tokio runtime available to run the connection probe")]
    NoRuntime,
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Minimum interval between liveness probes.
    pub check_period: Duration,
    pub buffer_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Writes allowed to queue on the socket before `can_send` reports false.
    pub max_pending_writes: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            check_period: Duration::from_secs(5),
            buffer_capacity: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
            max_pending_writes: 1024,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), SenderError> {
        if self.check_period.is_zero() {
            return Err(SenderError::InvalidConfiguration(
                "check_period must be greater than zero".to_string(),
            ));
        }
        if self.max_pending_writes == 0 {
            return Err(SenderError::InvalidConfiguration(
                "max_pending_writes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a command ended up after `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SendOutcome {
    /// Written to the socket.
    Sent,
    /// Held in the buffer for delivery after reconnect.
    Buffered,
    /// Refused by a full buffer.
    Rejected,
}

impl SendOutcome {
    pub fn is_sent(self) -> bool {
        self == SendOutcome::Sent
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub written: usize,
    pub remaining: usize,
    /// A write failed and the rest of the buffer was kept.
    pub interrupted: bool,
}

struct Shared<T: Transport> {
    transport: AsyncMutex<T>,
    tracker: ConnectionTracker,
    buffer: CommandBuffer,
    stats: AtomicSenderStats,
    endpoint: String,
    closed: AtomicBool,
}

impl<T: Transport> Shared<T> {
    fn buffer_line(&self, line: String) -> SendOutcome {
        match self.buffer.push(line) {
            Ok(PushOutcome::Queued) => {
                self.stats.record_buffered();
                SendOutcome::Buffered
            }
            Ok(PushOutcome::QueuedAfterDrop(_)) => {
                self.stats.record_buffered();
                self.stats.record_dropped();
                SendOutcome::Buffered
            }
            Err(_) => {
                self.stats.record_rejected();
                SendOutcome::Rejected
            }
        }
    }

    /// Write buffered lines oldest first. Caller holds the transport lock.
    async fn drain_locked(&self, transport: &mut T) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(line) = self.buffer.pop_front() {
            if let Err(e) = transport.write_line(&line).await {
                self.buffer.requeue_front(line);
                self.stats.record_write_failure();
                self.tracker.mark_down(&e.to_string());
                warn!(
                    "Drain to {} interrupted after {} commands: {}",
                    self.endpoint, report.written, e
                );
                report.interrupted = true;
                break;
            }
            report.written += 1;
        }

        if report.written > 0 {
            self.stats.record_drained(report.written);
            if !report.interrupted {
                self.tracker.mark_up();
            }
            info!(
                "Delivered {} buffered commands to {}",
                report.written, self.endpoint
            );
        }

        report.remaining = self.buffer.len();
        report
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// While `UP`, a recent successful write counts as a check and the
    /// tick is skipped. While `DOWN` every tick attempts a reconnect.
    async fn probe_once(&self, force: bool) -> ConnectionState {
        if self.is_closed() {
            return self.tracker.state();
        }
        if !force && self.tracker.is_up() && !self.tracker.is_check_due() {
            return self.tracker.state();
        }

        let mut transport = self.transport.lock().await;
        if self.is_closed() {
            return self.tracker.state();
        }
        self.stats.record_probe();

        let result = if transport.is_connected() {
            match transport.check_alive().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    debug!("Liveness check on {} failed: {}", self.endpoint, e);
                    self.tracker.mark_down(&e.to_string());
                    transport.connect().await
                }
            }
        } else {
            transport.connect().await
        };

        match result {
            Ok(()) => {
                if self.tracker.mark_up() {
                    self.stats.record_reconnect();
                }
                if !self.buffer.is_empty() {
                    self.drain_locked(&mut transport).await;
                }
            }
            Err(e) => {
                self.tracker.mark_down(&e.to_string());
                debug!("Reconnect to {} failed: {}", self.endpoint, e);
            }
        }

        self.tracker.state()
    }
}

struct ProbeTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn spawn_probe<T: Transport>(
    shared: Arc<Shared<T>>,
    period: Duration,
    runtime: &Handle,
) -> ProbeTask {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    shared.probe_once(false).await;
                }
            }
        }

        debug!("Connection probe for {} stopped", shared.endpoint);
    });

    ProbeTask { cancel, handle }
}

/// Streams composed command lines over a persistent plain-text connection.
///
/// While the connection is `DOWN`, or the socket already has too many writes
/// queued, `send` appends to an in-memory buffer and returns without waiting
/// on the network. A background probe reconnects every `check_period` and
/// delivers the buffer, oldest first, ahead of any new command.
///
/// The sender is `Sync`; share it with `Arc` across tasks.
pub struct PlainCommandSender<T: Transport = TcpTransport> {
    shared: Arc<Shared<T>>,
    probe: parking_lot::Mutex<Option<ProbeTask>>,
}

impl<T: Transport> PlainCommandSender<T> {
    /// Connect and start the probe. The first connection must succeed.
    pub async fn connect(mut transport: T, config: SenderConfig) -> Result<Self, SenderError> {
        config.validate()?;
        let endpoint = transport.endpoint();

        transport
            .connect()
            .await
            .map_err(|source| SenderError::InitialConnect {
                endpoint: endpoint.clone(),
                source,
            })?;

        let sender = Self::build(transport, &config, ConnectionState::Up)?;
        sender.shared.tracker.mark_up();
        info!("Plain command sender connected to {}", endpoint);
        Ok(sender)
    }

    /// Start `DOWN` and let the probe establish the connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_disconnected(transport: T, config: SenderConfig) -> Result<Self, SenderError> {
        config.validate()?;
        Self::build(transport, &config, ConnectionState::Down)
    }

    fn build(
        transport: T,
        config: &SenderConfig,
        initial: ConnectionState,
    ) -> Result<Self, SenderError> {
        let runtime = Handle::try_current().map_err(|_| SenderError::NoRuntime)?;
        let buffer = CommandBuffer::new(config.buffer_capacity, config.overflow_policy)?;

        let endpoint = transport.endpoint();

        let shared = Arc::new(Shared {
            transport: AsyncMutex::new(transport),
            tracker: ConnectionTracker::new(
                config.check_period,
                config.max_pending_writes,
                initial,
            ),
            buffer,
            stats: AtomicSenderStats::new(),
            endpoint,
            closed: AtomicBool::new(false),
        });

        let probe = spawn_probe(shared.clone(), config.check_period, &runtime);

        Ok(Self {
            shared,
            probe: parking_lot::Mutex::new(Some(probe)),
        })
    }

    /// Whether a `send` right now would go to the socket rather than the buffer.
    pub fn can_send(&self) -> bool {
        self.shared.tracker.can_send()
    }

    pub async fn send(&self, command: &Command) -> SendOutcome {
        self.send_line(command.compose()).await
    }

    /// Send a pre-rendered line. A trailing newline is added when missing.
    pub async fn send_line(&self, line: impl Into<String>) -> SendOutcome {
        let mut line = line.into();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let shared = &self.shared;
        if shared.is_closed() || !shared.tracker.can_send() {
            debug!("Connection to {} unavailable, buffering command", shared.endpoint);
            return shared.buffer_line(line);
        }

        let _pending = shared.tracker.begin_write();
        let mut transport = shared.transport.lock().await;

        // The connection may have dropped while we waited for the lock.
        if shared.is_closed() || !shared.tracker.is_up() {
            return shared.buffer_line(line);
        }

        if !shared.buffer.is_empty() && shared.drain_locked(&mut transport).await.interrupted {
            return shared.buffer_line(line);
        }

        match transport.write_line(&line).await {
            Ok(()) => {
                shared.tracker.mark_up();
                shared.stats.record_sent(line.len());
                SendOutcome::Sent
            }
            Err(e) => {
                shared.stats.record_write_failure();
                shared.tracker.mark_down(&e.to_string());
                warn!(
                    "Write to {} failed, buffering command: {}",
                    shared.endpoint, e
                );
                shared.buffer_line(line)
            }
        }
    }

    /// Deliver the buffer now if the connection is `UP`.
    pub async fn drain_buffer(&self) -> DrainReport {
        let shared = &self.shared;
        if shared.is_closed() || !shared.tracker.is_up() || shared.buffer.is_empty() {
            return DrainReport {
                remaining: shared.buffer.len(),
                ..DrainReport::default()
            };
        }

        let mut transport = shared.transport.lock().await;
        shared.drain_locked(&mut transport).await
    }

    /// Take every buffered line, oldest first, leaving the buffer empty.
    pub fn remove_saved_plain_commands(&self) -> Vec<String> {
        self.shared.buffer.take_all()
    }

    /// Run a liveness probe immediately, ignoring `check_period`.
    pub async fn probe_now(&self) -> ConnectionState {
        self.shared.probe_once(true).await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn buffered_len(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.tracker.state()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.shared.tracker
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn stats(&self) -> SenderStats {
        self.shared.stats.snapshot()
    }

    pub fn buffer_metrics(&self) -> BufferMetrics {
        self.shared.buffer.metrics()
    }

    /// Stop the probe and close the socket.
    ///
    /// Buffered lines are kept; collect them with
    /// [`remove_saved_plain_commands`](Self::remove_saved_plain_commands).
    /// A closed sender never reconnects: later sends go to the buffer.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let task = self.probe.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await
                && e.is_panic()
            {
                error!("Connection probe panicked: {}", e);
            }
        }

        let mut transport = self.shared.transport.lock().await;
        transport.shutdown().await;
        self.shared.tracker.mark_down("sender closed");

        let pending = self.shared.buffer.len();
        if pending > 0 {
            info!(
                "Sender for {} closed with {} undelivered commands",
                self.shared.endpoint, pending
            );
        }
    }
}

impl<T: Transport> Drop for PlainCommandSender<T> {
    fn drop(&mut self) {
        if let Some(task) = self.probe.get_mut().take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}
