use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const SPOOL_EXTENSION: &str = "spool";

// Orders stores that land in the same millisecond.
static STORE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::error::EncodeError),
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] bincode::error::DecodeError),
    #[error("Spool file not found: {0}")]
    SpoolNotFound(String),
    #[error("Disk space exceeded")]
    DiskSpaceExceeded,
    #[error("System time error: {0}")]
    SystemTimeError(String),
}

#[derive(Debug, Clone)]
pub struct SpoolConfig {
    pub storage_path: PathBuf,
    /// Upper bound on bytes held in the spool directory.
    pub max_disk_usage: u64,
    pub retention_period: Duration,
    pub compression: bool,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("/tmp/tsd-client/spool"),
            max_disk_usage: 256 * 1024 * 1024,
            retention_period: Duration::from_secs(7 * 24 * 3600),
            compression: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SpooledLines {
    id: String,
    stored_at: u64,
    lines: Vec<String>,
}

/// On-disk holding area for command lines that could not be delivered
/// before shutdown.
///
/// Each `store` writes one file named `<millis>-<sequence>-<uuid>.spool`, so
/// sorting by name replays stores in the order they happened.
pub struct DiskSpool {
    config: SpoolConfig,
    current_usage: u64,
}

fn unix_millis() -> Result<u64, DiskError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| DiskError::SystemTimeError(format!("Invalid system time: {e}")))?
        .as_millis() as u64)
}

impl DiskSpool {
    pub async fn new(config: SpoolConfig) -> Result<Self, DiskError> {
        fs::create_dir_all(&config.storage_path).await?;
        let current_usage = Self::calculate_disk_usage(&config.storage_path).await?;

        Ok(Self {
            config,
            current_usage,
        })
    }

    /// Persist `lines` as one spool file. Returns its id, or `None` when
    /// there was nothing to store.
    pub async fn store(&mut self, lines: Vec<String>) -> Result<Option<String>, DiskError> {
        if lines.is_empty() {
            return Ok(None);
        }

        let stored_at = unix_millis()?;
        let sequence = STORE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = format!("{stored_at:013}-{sequence:020}-{}", uuid::Uuid::new_v4());
        let count = lines.len();

        let record = SpooledLines {
            id: id.clone(),
            stored_at,
            lines,
        };
        let serialized = bincode::serde::encode_to_vec(&record, bincode::config::standard())?;

        let data = if self.config.compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(&serialized)?;
            encoder.finish()?
        } else {
            serialized
        };

        if self.current_usage + data.len() as u64 > self.config.max_disk_usage {
            warn!(
                "Spool directory {} is full, {} commands not stored",
                self.config.storage_path.display(),
                count
            );
            return Err(DiskError::DiskSpaceExceeded);
        }

        let mut file = fs::File::create(self.spool_file_path(&id)).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        self.current_usage += data.len() as u64;

        debug!("Spooled {} commands as {} ({} bytes)", count, id, data.len());
        Ok(Some(id))
    }

    /// Ids of stored spool files, oldest first.
    pub async fn list_spooled(&self) -> Result<Vec<String>, DiskError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.config.storage_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(SPOOL_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                ids.push(stem.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    pub async fn load(&self, id: &str) -> Result<Vec<String>, DiskError> {
        Ok(self.load_record(id).await?.lines)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), DiskError> {
        let path = self.spool_file_path(id);
        if !path.exists() {
            return Err(DiskError::SpoolNotFound(id.to_string()));
        }

        let size = fs::metadata(&path).await?.len();
        fs::remove_file(&path).await?;
        self.current_usage = self.current_usage.saturating_sub(size);
        Ok(())
    }

    /// Load and delete every spool file, returning all lines in store order.
    ///
    /// Unreadable files are logged and left in place.
    pub async fn restore_all(&mut self) -> Result<Vec<String>, DiskError> {
        let mut restored = Vec::new();

        for id in self.list_spooled().await? {
            match self.load(&id).await {
                Ok(lines) => {
                    restored.extend(lines);
                    self.delete(&id).await?;
                }
                Err(e) => warn!("Skipping unreadable spool file {}: {}", id, e),
            }
        }

        if !restored.is_empty() {
            info!(
                "Restored {} spooled commands from {}",
                restored.len(),
                self.config.storage_path.display()
            );
        }
        Ok(restored)
    }

    /// Delete spool files older than the retention period.
    pub async fn cleanup_expired(&mut self) -> Result<u32, DiskError> {
        let now = unix_millis()?;
        let retention = self.config.retention_period.as_millis() as u64;
        let mut deleted = 0;

        for id in self.list_spooled().await? {
            if let Ok(record) = self.load_record(&id).await
                && now.saturating_sub(record.stored_at) > retention
                && self.delete(&id).await.is_ok()
            {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Removed {deleted} expired spool files");
        }
        Ok(deleted)
    }

    pub fn current_disk_usage(&self) -> u64 {
        self.current_usage
    }

    pub fn storage_path(&self) -> &Path {
        &self.config.storage_path
    }

    fn spool_file_path(&self, id: &str) -> PathBuf {
        self.config
            .storage_path
            .join(format!("{id}.{SPOOL_EXTENSION}"))
    }

    async fn load_record(&self, id: &str) -> Result<SpooledLines, DiskError> {
        let path = self.spool_file_path(id);
        if !path.exists() {
            return Err(DiskError::SpoolNotFound(id.to_string()));
        }

        let mut file = fs::File::open(&path).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;

        let decoded = Self::decompress(&data).unwrap_or(data);
        let (record, _): (SpooledLines, usize) =
            bincode::serde::decode_from_slice(&decoded, bincode::config::standard())?;
        Ok(record)
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }

    async fn calculate_disk_usage(path: &Path) -> Result<u64, DiskError> {
        let mut total_size = 0u64;
        let mut entries = fs::read_dir(path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                total_size += entry.metadata().await?.len();
            }
        }

        Ok(total_size)
    }
}
