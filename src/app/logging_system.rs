use super::config::{LogFormat, LogLevel};
use parking_lot::RwLock;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },
    #[error("Logging initialization failed: {0}")]
    InitFailed(String),
}

// Dependencies that are chatty at debug level.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

pub struct LoggingSystem {
    directives: RwLock<Vec<Directive>>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: RwLock::new(Vec::new()),
        }
    }

    /// Add a `target=level` directive. Malformed directives are rejected.
    pub fn add_directive(&self, directive: &str) -> Result<(), LoggingError> {
        let parsed = Directive::from_str(directive).map_err(|e| LoggingError::InvalidDirective {
            directive: directive.to_string(),
            reason: e.to_string(),
        })?;
        self.directives.write().push(parsed);
        Ok(())
    }

    pub fn add_default_directives(&self) -> Result<(), LoggingError> {
        for target in QUIET_TARGETS {
            self.add_directive(&format!("{target}=warn"))?;
        }
        Ok(())
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();

        let mut parts = Vec::with_capacity(directives.len() + 1);
        parts.push(default_level.as_str().to_string());
        parts.extend(directives.iter().map(ToString::to_string));
        parts.join(",")
    }

    /// Install the global subscriber. `RUST_LOG`, when set, wins over the
    /// configured level.
    pub fn initialize_tracing(
        &self,
        default_level: LogLevel,
        format: LogFormat,
    ) -> Result<(), LoggingError> {
        let env_filter = match std::env::var("RUST_LOG") {
            Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(&spec),
            _ => EnvFilter::try_new(self.build_filter_string(default_level)),
        }
        .map_err(|e| LoggingError::InitFailed(format!("Failed to build EnvFilter: {e}")))?;

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = match format {
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        result.map_err(|e| LoggingError::InitFailed(e.to_string()))
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging once per process; later calls return the first result.
pub fn setup_logging(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    let outcome = INIT.get_or_init(|| {
        let logging_system = LoggingSystem::new();
        logging_system
            .add_default_directives()
            .and_then(|()| logging_system.initialize_tracing(level, format))
            .map_err(|e| e.to_string())
    });

    outcome.clone().map_err(LoggingError::InitFailed)
}
