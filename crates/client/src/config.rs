//! Client configuration.
//!
//! Loaded once from TOML at process start and passed by reference; every
//! field falls back to its default when absent.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use filestream_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MAX_REQUEST_SIZE, DEFAULT_RAW_MAX_FILE_SIZE, DEFAULT_READ_TIMEOUT_MS,
};
use filestream_transfer::{DEFAULT_MEMORY_WARN_BYTES, TransferLimits, TransferMode};

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Upload client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection-establishment timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read/response timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Bytes per streamed chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Per-file ceiling for multipart uploads.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Per-request ceiling for multipart uploads.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: u64,

    /// Per-file ceiling for raw uploads.
    #[serde(default = "default_raw_max_file_size")]
    pub raw_max_file_size: u64,

    /// Resident memory, in bytes, above which progress samples log a warning;
    /// zero turns sampling off.
    #[serde(default = "default_memory_warn_threshold")]
    pub memory_warn_threshold: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_max_request_size() -> u64 {
    DEFAULT_MAX_REQUEST_SIZE
}

fn default_raw_max_file_size() -> u64 {
    DEFAULT_RAW_MAX_FILE_SIZE
}

fn default_memory_warn_threshold() -> u64 {
    DEFAULT_MEMORY_WARN_BYTES
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            chunk_size: default_chunk_size(),
            max_file_size: default_max_file_size(),
            max_request_size: default_max_request_size(),
            raw_max_file_size: default_raw_max_file_size(),
            memory_warn_threshold: default_memory_warn_threshold(),
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "client configuration loaded");
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Size ceilings that apply to `mode`.
    ///
    /// A raw upload carries a single file, so its request ceiling equals the
    /// raw per-file ceiling.
    pub fn limits_for(&self, mode: TransferMode) -> TransferLimits {
        match mode {
            TransferMode::Raw => TransferLimits::new(self.raw_max_file_size, self.raw_max_file_size),
            TransferMode::Multipart => TransferLimits::new(self.max_file_size, self.max_request_size),
        }
    }
}
