use crate::domain::Command;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const COMMAND_PATH: &str = "api/v1/command";
const VERSION_PATH: &str = "api/v1/version";

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("HTTP error: {status} - {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Server base URL, e.g. `http://localhost:8088`.
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8088".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            user_agent: format!("tsd-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub commands_posted: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
struct AtomicRequestStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    commands_posted: AtomicU64,
    total_response_millis: AtomicU64,
}

impl AtomicRequestStats {
    fn record(&self, success: bool, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> RequestStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_millis = self.total_response_millis.load(Ordering::Relaxed);

        RequestStats {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            commands_posted: self.commands_posted.load(Ordering::Relaxed),
            average_response_time: if total_requests > 0 {
                Duration::from_millis(total_millis / total_requests)
            } else {
                Duration::ZERO
            },
        }
    }
}

/// Request/response alternative to the streaming sender.
///
/// Posts command lines to the server's command endpoint in one request body
/// and reports the HTTP status, so callers learn about rejected batches.
#[derive(Debug)]
pub struct HttpCommandClient {
    client: Client,
    config: HttpConfig,
    command_url: Url,
    version_url: Url,
    stats: AtomicRequestStats,
}

fn endpoint_url(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{}/{}", base.path().trim_end_matches('/'), path));
    url
}

impl HttpCommandClient {
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let base: Url = config
            .endpoint
            .parse()
            .map_err(|e| HttpError::InvalidConfiguration(format!("Invalid endpoint URL: {e}")))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(HttpError::InvalidConfiguration(format!(
                "Unsupported URL scheme: {}",
                base.scheme()
            )));
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| {
                HttpError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            command_url: endpoint_url(&base, COMMAND_PATH),
            version_url: endpoint_url(&base, VERSION_PATH),
            stats: AtomicRequestStats::default(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn command_url(&self) -> &Url {
        &self.command_url
    }

    pub fn stats(&self) -> RequestStats {
        self.stats.snapshot()
    }

    pub async fn send_commands(&self, commands: &[Command]) -> Result<(), HttpError> {
        let body: String = commands.iter().map(Command::compose).collect();
        self.post_body(body, commands.len()).await
    }

    /// Post pre-rendered lines; missing trailing newlines are added.
    pub async fn send_lines(&self, lines: &[String]) -> Result<(), HttpError> {
        let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            body.push_str(line);
            if !line.ends_with('\n') {
                body.push('\n');
            }
        }
        self.post_body(body, lines.len()).await
    }

    /// GET the version endpoint; any 2xx answer means the server is reachable
    /// and the credentials are accepted.
    pub async fn health_check(&self) -> Result<(), HttpError> {
        let request = self.authorize(self.client.get(self.version_url.clone()));
        self.execute(request, "Health check").await
    }

    async fn post_body(&self, body: String, count: usize) -> Result<(), HttpError> {
        if count == 0 {
            return Ok(());
        }

        debug!(
            "Posting {} commands ({} bytes) to {}",
            count,
            body.len(),
            self.command_url
        );

        let request = self.authorize(
            self.client
                .post(self.command_url.clone())
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body),
        );

        self.execute(request, "Command post").await?;
        self.stats
            .commands_posted
            .fetch_add(count as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn execute(&self, request: RequestBuilder, what: &str) -> Result<(), HttpError> {
        let start = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                self.stats.record(false, start.elapsed());
                if e.is_timeout() {
                    return Err(HttpError::RequestTimeout(format!("{what} timed out")));
                }
                return Err(HttpError::Network(e));
            }
        };

        let status = response.status();
        self.stats.record(status.is_success(), start.elapsed());

        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        warn!("{} to {} failed with {}", what, self.config.endpoint, status);
        Err(HttpError::HttpStatus {
            status: status.as_u16(),
            message: if detail.is_empty() {
                format!("{what} failed: {status}")
            } else {
                detail
            },
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }
}
