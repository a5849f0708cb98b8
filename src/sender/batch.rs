use super::plain::PlainCommandSender;
use super::transport::{TcpTransport, Transport};
use crate::domain::Command;
use serde::Serialize;
use tracing::{debug, warn};

/// Sends a sequence of commands through one sender, in order.
///
/// A command counts as failed when it was not written to the socket
/// immediately, even if it was buffered for later delivery. With
/// `tolerate_failures` off the batch stops at the first failure and the
/// remaining commands are never attempted.
pub struct BatchDispatcher<'a, T: Transport = TcpTransport> {
    sender: &'a PlainCommandSender<T>,
}

/// Per-batch delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    /// Commands handed to the sender; less than `total` after an abort.
    pub attempted: usize,
    pub sent: usize,
}

impl BatchReport {
    pub fn all_sent(&self) -> bool {
        self.sent == self.total
    }

    pub fn aborted(&self) -> bool {
        self.attempted < self.total
    }
}

impl<'a, T: Transport> BatchDispatcher<'a, T> {
    pub fn new(sender: &'a PlainCommandSender<T>) -> Self {
        Self { sender }
    }

    /// Returns `true` only if every command was sent.
    pub async fn send_batch(&self, commands: &[Command], tolerate_failures: bool) -> bool {
        self.dispatch(
            commands.iter().map(Command::compose),
            commands.len(),
            tolerate_failures,
        )
        .await
        .all_sent()
    }

    pub async fn send_lines(&self, lines: &[String], tolerate_failures: bool) -> bool {
        self.dispatch_lines(lines, tolerate_failures).await.all_sent()
    }

    pub async fn dispatch_lines(&self, lines: &[String], tolerate_failures: bool) -> BatchReport {
        self.dispatch(lines.iter().cloned(), lines.len(), tolerate_failures)
            .await
    }

    async fn dispatch<I>(&self, lines: I, total: usize, tolerate_failures: bool) -> BatchReport
    where
        I: Iterator<Item = String>,
    {
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };

        for line in lines {
            report.attempted += 1;
            if self.sender.send_line(line).await.is_sent() {
                report.sent += 1;
                continue;
            }

            if !tolerate_failures {
                warn!(
                    "Batch aborted at command {} of {}: not sent to {}",
                    report.attempted,
                    total,
                    self.sender.endpoint()
                );
                return report;
            }
        }

        if report.sent < total {
            debug!(
                "Batch of {} finished with {} unsent commands",
                total,
                total - report.sent
            );
        }
        report
    }
}
