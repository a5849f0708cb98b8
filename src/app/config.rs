use crate::buffer::OverflowPolicy;
use crate::reliability::SpoolConfig;
use crate::sender::{HttpConfig, SenderConfig, TcpConfig};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// Same upper bound the command buffer enforces.
const MAX_BUFFER_CAPACITY: usize = 10_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Stream plain-text commands to a time-series database", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Ingestion host
    #[arg(long, env = "TSD_HOST", default_value = "localhost")]
    pub host: String,

    /// Plain-text ingestion port
    #[arg(long, env = "TSD_PORT", default_value = "8081")]
    pub port: u16,

    /// Minimum interval between connection probes in milliseconds
    #[arg(long, env = "TSD_CHECK_PERIOD_MS", default_value = "5000")]
    pub check_period_ms: u64,

    /// Lines held in memory while the connection is down
    #[arg(long, env = "TSD_BUFFER_CAPACITY", default_value = "10000")]
    pub buffer_capacity: usize,

    /// What to do when the buffer is full
    #[arg(long, env = "TSD_OVERFLOW_POLICY", value_enum, default_value = "drop-oldest")]
    pub overflow_policy: OverflowPolicy,

    /// Writes allowed in flight before new commands are buffered
    #[arg(long, env = "TSD_MAX_PENDING_WRITES", default_value = "1024")]
    pub max_pending_writes: usize,

    /// TCP connect timeout in seconds
    #[arg(long, env = "TSD_CONNECT_TIMEOUT_SECS", default_value = "5")]
    pub connect_timeout_secs: u64,

    /// TCP write timeout in seconds
    #[arg(long, env = "TSD_WRITE_TIMEOUT_SECS", default_value = "10")]
    pub write_timeout_secs: u64,

    /// Send through the HTTP command API instead of the plain-text port
    #[arg(long, env = "TSD_VIA_HTTP")]
    pub via_http: bool,

    /// HTTP API base URL
    #[arg(long, env = "TSD_HTTP_ENDPOINT", default_value = "http://localhost:8088")]
    pub http_endpoint: String,

    /// HTTP API user
    #[arg(long, env = "TSD_USERNAME")]
    pub username: Option<String>,

    /// HTTP API password
    #[arg(long, env = "TSD_PASSWORD", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "TSD_HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    /// Commands per batch
    #[arg(long, env = "TSD_BATCH_SIZE", default_value = "100")]
    pub batch_size: usize,

    /// Stop at the first command that is not delivered immediately
    #[arg(long, env = "TSD_FAIL_FAST")]
    pub fail_fast: bool,

    /// Directory for undelivered commands; disabled when unset
    #[arg(long, env = "TSD_SPOOL_PATH")]
    pub spool_path: Option<PathBuf>,

    /// Maximum spool size in MB
    #[arg(long, env = "TSD_MAX_SPOOL_MB", default_value = "256")]
    pub max_spool_mb: u64,

    /// Read commands from this file instead of stdin
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "TSD_LOG_LEVEL", value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "TSD_LOG_FORMAT", value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    /// Configuration file path (optional)
    #[arg(long, env = "TSD_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[serde(skip)]
    #[arg(skip)]
    pub check_period: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub connect_timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub write_timeout: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8081,
            check_period_ms: 5000,
            buffer_capacity: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
            max_pending_writes: 1024,
            connect_timeout_secs: 5,
            write_timeout_secs: 10,
            via_http: false,
            http_endpoint: "http://localhost:8088".to_string(),
            username: None,
            password: None,
            http_timeout_secs: 30,
            batch_size: 100,
            fail_fast: false,
            spool_path: None,
            max_spool_mb: 256,
            input: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
            check_period: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Parse CLI arguments (with env fallbacks). A `--config-file` replaces
    /// the parsed settings, except for `--input`.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);

        if let Some(path) = config.config_file.clone() {
            let input = config.input.take();
            config = Self::from_file(&path)?;
            config.config_file = Some(path);
            if input.is_some() {
                config.input = input;
            }
            return Ok(config);
        }

        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_string("TSD_HOST", &mut config.host);
        load_env_var("TSD_PORT", &mut config.port)?;
        load_env_var("TSD_CHECK_PERIOD_MS", &mut config.check_period_ms)?;
        load_env_var("TSD_BUFFER_CAPACITY", &mut config.buffer_capacity)?;
        load_env_var("TSD_MAX_PENDING_WRITES", &mut config.max_pending_writes)?;
        load_env_var("TSD_CONNECT_TIMEOUT_SECS", &mut config.connect_timeout_secs)?;
        load_env_var("TSD_WRITE_TIMEOUT_SECS", &mut config.write_timeout_secs)?;
        load_env_var("TSD_VIA_HTTP", &mut config.via_http)?;
        load_env_string("TSD_HTTP_ENDPOINT", &mut config.http_endpoint);
        load_env_string_opt("TSD_USERNAME", &mut config.username);
        load_env_string_opt("TSD_PASSWORD", &mut config.password);
        load_env_var("TSD_HTTP_TIMEOUT_SECS", &mut config.http_timeout_secs)?;
        load_env_var("TSD_BATCH_SIZE", &mut config.batch_size)?;
        load_env_var("TSD_FAIL_FAST", &mut config.fail_fast)?;
        load_env_path_opt("TSD_SPOOL_PATH", &mut config.spool_path);
        load_env_var("TSD_MAX_SPOOL_MB", &mut config.max_spool_mb)?;
        load_env_path_opt("TSD_CONFIG_FILE", &mut config.config_file);
        load_env_enum("TSD_OVERFLOW_POLICY", &mut config.overflow_policy)?;
        load_env_enum("TSD_LOG_LEVEL", &mut config.log_level)?;
        load_env_enum("TSD_LOG_FORMAT", &mut config.log_format)?;

        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) {
        self.check_period = Duration::from_millis(self.check_period_ms);
        self.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        self.write_timeout = Duration::from_secs(self.write_timeout_secs);
        self.http_timeout = Duration::from_secs(self.http_timeout_secs);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("Host must not be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.check_period_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Check period must be greater than 0".to_string(),
            ));
        }

        if self.buffer_capacity == 0 || self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::InvalidConfig(format!(
                "Buffer capacity must be between 1 and {MAX_BUFFER_CAPACITY}, got {}",
                self.buffer_capacity
            )));
        }

        if self.max_pending_writes == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max pending writes must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0
            || self.write_timeout_secs == 0
            || self.http_timeout_secs == 0
        {
            return Err(ConfigError::InvalidConfig(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.via_http {
            Url::parse(&self.http_endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!(
                    "Invalid HTTP endpoint URL '{}': {}",
                    self.http_endpoint, e
                ))
            })?;
        }

        if let Some(spool_path) = &self.spool_path
            && let Some(parent) = spool_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Spool parent directory does not exist: {}",
                parent.display()
            )));
        }

        Ok(())
    }

    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
            nodelay: true,
        }
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            check_period: self.check_period,
            buffer_capacity: self.buffer_capacity,
            overflow_policy: self.overflow_policy,
            max_pending_writes: self.max_pending_writes,
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            endpoint: self.http_endpoint.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.http_timeout,
            ..HttpConfig::default()
        }
    }

    pub fn spool_config(&self) -> Option<SpoolConfig> {
        self.spool_path.as_ref().map(|path| SpoolConfig {
            storage_path: path.clone(),
            max_disk_usage: self.max_spool_mb * 1024 * 1024,
            ..SpoolConfig::default()
        })
    }
}

/// Load and parse an environment variable; a missing variable keeps the default.
fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        *target = value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

fn load_env_enum<T: ValueEnum>(name: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(name) {
        *target = T::from_str(&value, true)
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

fn load_env_string_opt(name: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(value);
    }
}

fn load_env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}

fn load_env_path_opt(name: &str, target: &mut Option<PathBuf>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(PathBuf::from(value));
    }
}
