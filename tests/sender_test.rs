use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tsd_client::buffer::OverflowPolicy;
use tsd_client::domain::{
    Command, MultipleInsertCommand, OrderedMap, Sample, SeriesCommand, Tags,
};
use tsd_client::sender::{
    BatchDispatcher, ConnectionState, PlainCommandSender, SendOutcome, SenderConfig, Transport,
    TransportError,
};

/// Shared view of what a `RecordingTransport` has seen.
#[derive(Clone, Default)]
struct Wire {
    lines: Arc<Mutex<Vec<String>>>,
    refuse_connect: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    /// 1-based write number that fails once; 0 disables.
    fail_on_write: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    /// Time each `connect` takes before it answers.
    connect_delay_ms: Arc<AtomicU64>,
}

impl Wire {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

struct RecordingTransport {
    wire: Wire,
    connected: bool,
}

impl RecordingTransport {
    fn new(wire: &Wire) -> Self {
        Self {
            wire: wire.clone(),
            connected: false,
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.wire.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.wire.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.wire.refuse_connect.load(Ordering::SeqCst) {
            self.connected = false;
            return Err(TransportError::NotConnected);
        }
        self.connected = true;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let n = self.wire.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.wire.fail_writes.load(Ordering::SeqCst)
            || self.wire.fail_on_write.load(Ordering::SeqCst) == n
        {
            self.connected = false;
            return Err(TransportError::Closed);
        }

        // Yield mid-write so concurrent senders get a chance to interleave.
        tokio::task::yield_now().await;
        self.wire.lines.lock().push(line.to_string());
        Ok(())
    }

    async fn check_alive(&mut self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn shutdown(&mut self) {
        self.connected = false;
    }

    fn endpoint(&self) -> String {
        "recording:8081".to_string()
    }
}

fn quiet_config() -> SenderConfig {
    SenderConfig {
        check_period: Duration::from_secs(3600),
        ..SenderConfig::default()
    }
}

fn line(entity: &str, i: usize) -> String {
    format!("series e:{entity} m:m={i}.0\n")
}

#[tokio::test]
async fn test_send_while_down_buffers_one_per_call() {
    let wire = Wire::default();
    let sender =
        PlainCommandSender::start_disconnected(RecordingTransport::new(&wire), quiet_config())
            .unwrap();
    assert_eq!(sender.state(), ConnectionState::Down);

    for i in 0..10 {
        let command: Command = SeriesCommand::new("e", "m", Sample::new(i as f64))
            .unwrap()
            .into();
        assert_eq!(sender.send(&command).await, SendOutcome::Buffered);
        assert_eq!(sender.buffered_len(), i + 1);
    }

    assert!(wire.lines().is_empty());
    assert_eq!(wire.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_drain_after_forced_up_preserves_order() {
    let wire = Wire::default();
    let sender = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
        .await
        .unwrap();

    sender.tracker().mark_down("maintenance");
    for i in 0..5 {
        assert_eq!(sender.send_line(line("e", i)).await, SendOutcome::Buffered);
    }
    assert!(wire.lines().is_empty());

    sender.tracker().mark_up();
    let report = sender.drain_buffer().await;
    assert_eq!(report.written, 5);
    assert_eq!(report.remaining, 0);
    assert!(!report.interrupted);

    let expected: Vec<String> = (0..5).map(|i| line("e", i)).collect();
    assert_eq!(wire.lines(), expected);
    assert_eq!(sender.stats().drained, 5);
}

#[tokio::test]
async fn test_reconnect_delivers_backlog_before_new_commands() {
    let wire = Wire::default();
    wire.refuse_connect.store(true, Ordering::SeqCst);

    let sender =
        PlainCommandSender::start_disconnected(RecordingTransport::new(&wire), quiet_config())
            .unwrap();
    for i in 0..3 {
        sender.send_line(line("backlog", i)).await;
    }

    assert_eq!(sender.probe_now().await, ConnectionState::Down);
    assert_eq!(sender.buffered_len(), 3);

    wire.refuse_connect.store(false, Ordering::SeqCst);
    assert_eq!(sender.probe_now().await, ConnectionState::Up);
    assert_eq!(sender.buffered_len(), 0);

    assert_eq!(sender.send_line(line("fresh", 0)).await, SendOutcome::Sent);
    assert_eq!(
        wire.lines(),
        vec![
            line("backlog", 0),
            line("backlog", 1),
            line("backlog", 2),
            line("fresh", 0)
        ]
    );
    assert_eq!(sender.stats().reconnects, 1);
}

#[tokio::test]
async fn test_write_failure_buffers_and_probe_recovers() {
    let wire = Wire::default();
    let sender = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
        .await
        .unwrap();

    assert_eq!(sender.send_line(line("a", 0)).await, SendOutcome::Sent);

    wire.fail_writes.store(true, Ordering::SeqCst);
    assert_eq!(sender.send_line(line("a", 1)).await, SendOutcome::Buffered);
    assert_eq!(sender.state(), ConnectionState::Down);
    assert!(!sender.can_send());

    // Down now: no further write attempts.
    assert_eq!(sender.send_line(line("a", 2)).await, SendOutcome::Buffered);

    wire.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(sender.probe_now().await, ConnectionState::Up);
    assert_eq!(wire.lines(), vec![line("a", 0), line("a", 1), line("a", 2)]);

    let stats = sender.stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.drained, 2);
    assert_eq!(stats.write_failures, 1);
}

#[tokio::test]
async fn test_interrupted_drain_keeps_remainder() {
    let wire = Wire::default();
    let sender = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
        .await
        .unwrap();

    sender.tracker().mark_down("maintenance");
    for i in 0..4 {
        sender.send_line(line("d", i)).await;
    }
    sender.tracker().mark_up();

    wire.fail_on_write.store(3, Ordering::SeqCst);
    let report = sender.drain_buffer().await;
    assert!(report.interrupted);
    assert_eq!(report.written, 2);
    assert_eq!(report.remaining, 2);
    assert_eq!(sender.state(), ConnectionState::Down);

    assert_eq!(
        sender.remove_saved_plain_commands(),
        vec![line("d", 2), line("d", 3)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_write_whole_lines() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 50;

    let wire = Wire::default();
    let sender = Arc::new(
        PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..TASKS)
        .map(|t| {
            let sender = sender.clone();
            tokio::spawn(async move {
                let mut outcomes = Vec::with_capacity(PER_TASK);
                for i in 0..PER_TASK {
                    outcomes.push(sender.send_line(line(&format!("t{t}"), i)).await);
                }
                outcomes
            })
        })
        .collect();

    for handle in handles {
        let outcomes = handle.await.unwrap();
        assert!(outcomes.iter().all(|o| o.is_sent()));
    }

    let lines = wire.lines();
    assert_eq!(lines.len(), TASKS * PER_TASK);
    assert!(lines.iter().all(|l| l.starts_with("series e:t") && l.ends_with(".0\n")));
    assert!(lines.iter().all(|l| l.matches('\n').count() == 1));

    // Each task's own commands stay in the order it sent them.
    for t in 0..TASKS {
        let entity = format!("t{t}");
        let own: Vec<String> = lines
            .iter()
            .filter(|l| l.starts_with(&format!("series e:{entity} ")))
            .cloned()
            .collect();
        let expected: Vec<String> = (0..PER_TASK).map(|i| line(&entity, i)).collect();
        assert_eq!(own, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_while_down_are_all_buffered() {
    let wire = Wire::default();
    let sender = Arc::new(
        PlainCommandSender::start_disconnected(RecordingTransport::new(&wire), quiet_config())
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let sender = sender.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    let outcome = sender.send_line(line(&format!("w{t}"), i)).await;
                    assert_eq!(outcome, SendOutcome::Buffered);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(sender.buffered_len(), 400);
    assert_eq!(sender.stats().buffered, 400);
}

#[tokio::test]
async fn test_overflow_policies() {
    let wire = Wire::default();
    let dropping = PlainCommandSender::start_disconnected(
        RecordingTransport::new(&wire),
        SenderConfig {
            buffer_capacity: 3,
            ..quiet_config()
        },
    )
    .unwrap();

    for i in 0..5 {
        assert_eq!(dropping.send_line(line("o", i)).await, SendOutcome::Buffered);
    }
    assert_eq!(
        dropping.remove_saved_plain_commands(),
        vec![line("o", 2), line("o", 3), line("o", 4)]
    );
    assert_eq!(dropping.stats().dropped, 2);

    let rejecting = PlainCommandSender::start_disconnected(
        RecordingTransport::new(&wire),
        SenderConfig {
            buffer_capacity: 3,
            overflow_policy: OverflowPolicy::RejectNewest,
            ..quiet_config()
        },
    )
    .unwrap();

    for i in 0..3 {
        rejecting.send_line(line("r", i)).await;
    }
    assert_eq!(rejecting.send_line(line("r", 3)).await, SendOutcome::Rejected);
    assert_eq!(rejecting.buffered_len(), 3);
    assert_eq!(rejecting.stats().rejected, 1);
}

#[tokio::test]
async fn test_intolerant_batch_writes_only_first_command() {
    let wire = Wire::default();
    wire.fail_on_write.store(2, Ordering::SeqCst);

    let sender = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
        .await
        .unwrap();
    let dispatcher = BatchDispatcher::new(&sender);

    let commands: Vec<Command> = ["a", "b", "c"]
        .iter()
        .map(|e| {
            SeriesCommand::new(*e, "m", Sample::new(1.0))
                .unwrap()
                .into()
        })
        .collect();

    assert!(!dispatcher.send_batch(&commands, false).await);
    assert_eq!(wire.lines(), vec!["series e:a m:m=1.0\n".to_string()]);
    assert_eq!(wire.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_tolerant_batch_attempts_every_command() {
    let wire = Wire::default();
    wire.fail_on_write.store(2, Ordering::SeqCst);

    let sender = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
        .await
        .unwrap();
    let dispatcher = BatchDispatcher::new(&sender);

    let tags: Tags = OrderedMap::from([("k", "v".to_string())]);
    let insert = MultipleInsertCommand::new(
        "e1",
        Some(1000),
        tags,
        OrderedMap::from([("m1", 1.0), ("m2", 2.0)]),
    )
    .unwrap();
    let commands: Vec<Command> = vec![insert.clone().into(), insert.clone().into(), insert.into()];

    let report = dispatcher
        .dispatch_lines(
            &commands.iter().map(Command::compose).collect::<Vec<_>>(),
            true,
        )
        .await;
    assert_eq!(report.attempted, 3);
    assert_eq!(report.sent, 1);
    assert!(!report.all_sent());

    // The failed write took the connection down, so the rest were buffered.
    assert_eq!(sender.buffered_len(), 2);
    assert_eq!(
        wire.lines(),
        vec!["series e:e1 ms:1000 t:k=v m:m1=1.0 m:m2=2.0\n".to_string()]
    );
}

#[tokio::test]
async fn test_background_probe_reconnects_and_close_stops_it() {
    let wire = Wire::default();
    wire.refuse_connect.store(true, Ordering::SeqCst);

    let sender = PlainCommandSender::start_disconnected(
        RecordingTransport::new(&wire),
        SenderConfig {
            check_period: Duration::from_millis(20),
            ..SenderConfig::default()
        },
    )
    .unwrap();
    sender.send_line(line("bg", 0)).await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(wire.connects.load(Ordering::SeqCst) >= 2);
    assert_eq!(sender.state(), ConnectionState::Down);

    wire.refuse_connect.store(false, Ordering::SeqCst);
    let mut delivered = false;
    for _ in 0..100 {
        if wire.lines() == vec![line("bg", 0)] {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "probe never delivered the buffered command");
    assert_eq!(sender.state(), ConnectionState::Up);

    sender.close().await;
    assert_eq!(sender.state(), ConnectionState::Down);

    let probes = sender.stats().probes;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sender.stats().probes, probes);
}

#[tokio::test]
async fn test_slow_refused_reconnects_keep_check_period() {
    let wire = Wire::default();
    wire.refuse_connect.store(true, Ordering::SeqCst);
    wire.connect_delay_ms.store(40, Ordering::SeqCst);

    let sender = PlainCommandSender::start_disconnected(
        RecordingTransport::new(&wire),
        SenderConfig {
            check_period: Duration::from_millis(100),
            ..SenderConfig::default()
        },
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1050)).await;
    sender.close().await;

    // Ticks at 100ms..1000ms; each attempt takes 40ms and must not push
    // the next one back by a whole period.
    let attempts = wire.connects.load(Ordering::SeqCst);
    assert!(attempts >= 8, "only {attempts} reconnect attempts");
    assert_eq!(sender.state(), ConnectionState::Down);
}

#[tokio::test]
async fn test_close_releases_transport_for_good() {
    let wire = Wire::default();
    let sender = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config())
        .await
        .unwrap();
    assert_eq!(sender.send_line(line("c", 0)).await, SendOutcome::Sent);

    sender.close().await;
    assert_eq!(sender.probe_now().await, ConnectionState::Down);
    assert_eq!(sender.send_line(line("c", 1)).await, SendOutcome::Buffered);

    assert_eq!(wire.connects.load(Ordering::SeqCst), 1);
    assert_eq!(wire.lines(), vec![line("c", 0)]);
    assert_eq!(sender.remove_saved_plain_commands(), vec![line("c", 1)]);
}

#[tokio::test]
async fn test_initial_connect_failure_is_reported() {
    let wire = Wire::default();
    wire.refuse_connect.store(true, Ordering::SeqCst);

    let result = PlainCommandSender::connect(RecordingTransport::new(&wire), quiet_config()).await;
    let err = result.err().unwrap();
    assert!(err.to_string().contains("recording:8081"));
}
