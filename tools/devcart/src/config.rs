//! Transfer and session configuration.
//!
//! Defaults reproduce the behavior of the FTDI-based cartridge link; a JSON
//! file can override any of them and command-line options override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Each 64-byte USB packet from the FTDI chip carries two modem status bytes.
const fn usb_payload(packet: usize) -> usize {
    packet - (packet / 64) * 2
}

/// Largest read handed to the channel (64 KiB USB read chunk).
pub const READ_CHUNK: usize = usb_payload(64 * 1024);
/// Largest write handed to the channel (4 KiB USB write chunk).
pub const WRITE_CHUNK: usize = usb_payload(4 * 1024);
/// Chunk size of the listener's reads.
pub const LISTEN_BUFFER: usize = 512;
/// Longest filename a listener accepts.
pub const MAX_FILENAME: usize = 4096;
/// Read timeout applied to transports that support one.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A chunk size of zero would stall the transfer loops.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field} must be at least 1 byte")]
pub struct ZeroChunk {
    pub field: &'static str,
}

/// Tuning of the transfer loops.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTransferConfig")]
pub struct TransferConfig {
    pub read_chunk: usize,
    pub write_chunk: usize,
    /// Consecutive zero-length transfers tolerated while waiting for data.
    /// `None` waits forever.
    pub idle_retry_limit: Option<u32>,
    pub listen_buffer: usize,
    pub max_filename: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            read_chunk: READ_CHUNK,
            write_chunk: WRITE_CHUNK,
            idle_retry_limit: None,
            listen_buffer: LISTEN_BUFFER,
            max_filename: MAX_FILENAME,
        }
    }
}

impl TransferConfig {
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }
}

/// Wire shape of [`TransferConfig`] before the sizes are checked.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTransferConfig {
    read_chunk: usize,
    write_chunk: usize,
    idle_retry_limit: Option<u32>,
    listen_buffer: usize,
    max_filename: usize,
}

impl Default for RawTransferConfig {
    fn default() -> Self {
        let config = TransferConfig::default();
        Self {
            read_chunk: config.read_chunk,
            write_chunk: config.write_chunk,
            idle_retry_limit: config.idle_retry_limit,
            listen_buffer: config.listen_buffer,
            max_filename: config.max_filename,
        }
    }
}

impl TryFrom<RawTransferConfig> for TransferConfig {
    type Error = ZeroChunk;

    fn try_from(raw: RawTransferConfig) -> Result<Self, Self::Error> {
        for (field, value) in [
            ("read_chunk", raw.read_chunk),
            ("write_chunk", raw.write_chunk),
            ("listen_buffer", raw.listen_buffer),
        ] {
            if value == 0 {
                return Err(ZeroChunk { field });
            }
        }
        Ok(Self {
            read_chunk: raw.read_chunk,
            write_chunk: raw.write_chunk,
            idle_retry_limit: raw.idle_retry_limit,
            listen_buffer: raw.listen_buffer,
            max_filename: raw.max_filename,
        })
    }
}

#[derive(Debug, Default)]
pub struct TransferConfigBuilder {
    config: TransferConfig,
}

impl TransferConfigBuilder {
    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.config.read_chunk = bytes.max(1);
        self
    }

    pub fn write_chunk(mut self, bytes: usize) -> Self {
        self.config.write_chunk = bytes.max(1);
        self
    }

    pub fn idle_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.config.idle_retry_limit = limit;
        self
    }

    pub fn listen_buffer(mut self, bytes: usize) -> Self {
        self.config.listen_buffer = bytes.max(1);
        self
    }

    pub fn max_filename(mut self, bytes: usize) -> Self {
        self.config.max_filename = bytes;
        self
    }

    pub fn build(self) -> TransferConfig {
        self.config
    }
}

/// Everything needed to open a link and run a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Character device of the cartridge link.
    pub device: Option<PathBuf>,
    /// `host:port` of a TCP bridge, used instead of `device`.
    pub tcp: Option<String>,
    pub timeout_ms: u64,
    /// Directory served to the cartridge in listener mode.
    pub root: Option<PathBuf>,
    pub transfer: TransferConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: None,
            tcp: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            root: None,
            transfer: TransferConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
