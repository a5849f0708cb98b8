use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Connection to {endpoint} failed: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("Connection closed by peer")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw byte channel to the ingestion port.
///
/// The ingestion port has no request/response framing, so failures show up
/// only on write or through `check_alive`. Implementations are used behind a
/// single mutex and never see concurrent calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open (or reopen) the connection, replacing any existing one.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Write one complete, newline-terminated command line.
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Cheap liveness check that must not block on the network.
    async fn check_alive(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn shutdown(&mut self);

    fn endpoint(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8081,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            nodelay: true,
        }
    }
}

/// Plain TCP connection to the ingestion port.
///
/// A write is bounded by `write_timeout`; a timed-out or failed write drops
/// the socket so the next `connect` starts from a clean stream.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let endpoint = self.endpoint();
        self.stream = None;

        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            endpoint: endpoint.clone(),
            timeout: self.config.connect_timeout,
        })?
        .map_err(|source| TransportError::ConnectFailed {
            endpoint: endpoint.clone(),
            source,
        })?;

        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }

        info!("Connected to ingestion port {}", endpoint);
        self.stream = Some(stream);
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        match timeout(self.config.write_timeout, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stream = None;
                Err(TransportError::Io(e))
            }
            Err(_) => {
                self.stream = None;
                Err(TransportError::WriteTimeout(self.config.write_timeout))
            }
        }
    }

    async fn check_alive(&mut self) -> Result<(), TransportError> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;

        // The port never answers, so a readable socket means EOF or an error.
        let mut scratch = [0u8; 256];
        match stream.try_read(&mut scratch) {
            Ok(0) => {
                self.stream = None;
                Err(TransportError::Closed)
            }
            Ok(n) => {
                debug!("Discarded {} unexpected bytes from ingestion port", n);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                self.stream = None;
                Err(TransportError::Io(e))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take()
            && let Err(e) = stream.shutdown().await
        {
            debug!("Socket shutdown error ignored: {}", e);
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}
