pub mod config;
pub mod logging_system;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging_system::{LoggingError, LoggingSystem, setup_logging};
pub use shutdown::spawn_signal_listener;

use crate::reliability::DiskSpool;
use crate::sender::{BatchDispatcher, HttpCommandClient, PlainCommandSender, TcpTransport};
use serde::Serialize;
use std::process;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Counts reported when `tsd-send` finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Non-empty lines read from the input.
    pub read: usize,
    /// Lines taken from the spool directory at startup.
    pub restored: usize,
    pub delivered: u64,
    /// Undelivered lines written to the spool on exit.
    pub spooled: usize,
    /// Undelivered lines dropped because no spool is configured.
    pub lost: usize,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, BoxError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::new(Config::from_args(args)?))
    }

    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read from `--input` or stdin until EOF or a shutdown signal.
    pub async fn run(self) -> Result<RunSummary, BoxError> {
        let token = CancellationToken::new();
        let signals = spawn_signal_listener(token.clone());

        let result = match &self.config.input {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?;
                self.run_with(BufReader::new(file), token.clone()).await
            }
            None => {
                self.run_with(BufReader::new(tokio::io::stdin()), token.clone())
                    .await
            }
        };

        token.cancel();
        if let Err(e) = signals.await {
            warn!("Signal listener ended abnormally: {}", e);
        }
        result
    }

    /// Forward every non-empty line of `input`, stopping early when `token`
    /// is cancelled.
    pub async fn run_with<R>(&self, input: R, token: CancellationToken) -> Result<RunSummary, BoxError>
    where
        R: AsyncBufRead + Unpin,
    {
        let spool = match self.config.spool_config() {
            Some(spool_config) => Some(DiskSpool::new(spool_config).await?),
            None => None,
        };

        if self.config.via_http {
            self.run_http(input.lines(), spool, token).await
        } else {
            self.run_plain(input.lines(), spool, token).await
        }
    }

    async fn run_plain<R>(
        &self,
        mut lines: Lines<R>,
        mut spool: Option<DiskSpool>,
        token: CancellationToken,
    ) -> Result<RunSummary, BoxError>
    where
        R: AsyncBufRead + Unpin,
    {
        let config = &self.config;
        let transport = TcpTransport::new(config.tcp_config());
        let sender = PlainCommandSender::connect(transport, config.sender_config()).await?;
        let dispatcher = BatchDispatcher::new(&sender);
        let mut summary = RunSummary::default();

        if let Some(spool) = spool.as_mut() {
            let restored = spool.restore_all().await?;
            summary.restored = restored.len();
            dispatcher.dispatch_lines(&restored, true).await;
        }

        let mut skipped = Vec::new();
        loop {
            let batch = read_batch(&mut lines, config.batch_size, &token).await?;
            if batch.is_empty() {
                break;
            }
            summary.read += batch.len();

            let report = dispatcher.dispatch_lines(&batch, !config.fail_fast).await;
            if report.aborted() {
                warn!(
                    "Stopping after an undelivered command ({} of {} in batch sent)",
                    report.sent, report.total
                );
                skipped.extend_from_slice(&batch[report.attempted..]);
                break;
            }
        }

        sender.drain_buffer().await;
        sender.close().await;

        let stats = sender.stats();
        summary.delivered = stats.sent + stats.drained;

        let mut undelivered = sender.remove_saved_plain_commands();
        undelivered.extend(skipped.into_iter().map(terminated));
        keep_undelivered(&mut summary, spool.as_mut(), undelivered).await;

        Ok(summary)
    }

    async fn run_http<R>(
        &self,
        mut lines: Lines<R>,
        mut spool: Option<DiskSpool>,
        token: CancellationToken,
    ) -> Result<RunSummary, BoxError>
    where
        R: AsyncBufRead + Unpin,
    {
        let config = &self.config;
        let client = HttpCommandClient::new(config.http_config())?;
        let mut summary = RunSummary::default();
        let mut undelivered = Vec::new();

        if let Some(spool) = spool.as_mut() {
            let restored = spool.restore_all().await?;
            summary.restored = restored.len();
            for chunk in restored.chunks(config.batch_size) {
                post_chunk(&client, chunk, &mut summary, &mut undelivered).await;
            }
        }

        loop {
            let batch = read_batch(&mut lines, config.batch_size, &token).await?;
            if batch.is_empty() {
                break;
            }
            summary.read += batch.len();

            if !post_chunk(&client, &batch, &mut summary, &mut undelivered).await
                && config.fail_fast
            {
                warn!("Stopping after a rejected HTTP batch");
                break;
            }
        }

        keep_undelivered(&mut summary, spool.as_mut(), undelivered).await;
        Ok(summary)
    }
}

async fn post_chunk(
    client: &HttpCommandClient,
    chunk: &[String],
    summary: &mut RunSummary,
    undelivered: &mut Vec<String>,
) -> bool {
    match client.send_lines(chunk).await {
        Ok(()) => {
            summary.delivered += chunk.len() as u64;
            true
        }
        Err(e) => {
            warn!("HTTP batch of {} commands failed: {}", chunk.len(), e);
            undelivered.extend(chunk.iter().cloned().map(terminated));
            false
        }
    }
}

async fn keep_undelivered(
    summary: &mut RunSummary,
    spool: Option<&mut DiskSpool>,
    undelivered: Vec<String>,
) {
    if undelivered.is_empty() {
        return;
    }

    let count = undelivered.len();
    match spool {
        Some(spool) => match spool.store(undelivered).await {
            Ok(_) => {
                summary.spooled = count;
                info!("Spooled {} undelivered commands", count);
            }
            Err(e) => {
                summary.lost = count;
                error!("Failed to spool {} undelivered commands: {}", count, e);
            }
        },
        None => {
            summary.lost = count;
            warn!("{} commands were not delivered and no spool is configured", count);
        }
    }
}

/// Spooled lines end in exactly one newline.
fn terminated(mut line: String) -> String {
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

/// Read up to `batch_size` non-empty lines. An empty batch means EOF or
/// cancellation.
async fn read_batch<R>(
    lines: &mut Lines<R>,
    batch_size: usize,
    token: &CancellationToken,
) -> std::io::Result<Vec<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut batch = Vec::with_capacity(batch_size);

    while batch.len() < batch_size {
        let next = tokio::select! {
            () = token.cancelled() => break,
            next = lines.next_line() => next?,
        };

        let Some(line) = next else {
            break;
        };
        let line = line.trim_end();
        if !line.trim_start().is_empty() {
            batch.push(line.to_string());
        }
    }

    Ok(batch)
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Entry point for the `tsd-send` binary.
pub async fn main() -> Result<(), BoxError> {
    let app = match App::from_args(std::env::args_os()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(2);
        }
    };

    if let Err(e) = setup_logging(app.config().log_level, app.config().log_format) {
        eprintln!("Warning: {e}");
    }

    info!("Starting tsd-send v{}", get_version());
    match app.run().await {
        Ok(summary) => {
            info!(
                "Finished: read={} restored={} delivered={} spooled={} lost={}",
                summary.read, summary.restored, summary.delivered, summary.spooled, summary.lost
            );
            if summary.lost > 0 {
                process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!("tsd-send failed: {}", e);
            process::exit(1);
        }
    }
}
