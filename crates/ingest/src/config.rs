//! Server configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use filestream_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_REQUEST_SIZE,
    DEFAULT_RAW_MAX_FILE_SIZE, DEFAULT_UPLOAD_DIR,
};

use filestream_transfer::DEFAULT_MEMORY_WARN_BYTES;

use crate::naming::FilenamePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address: {0}")]
    InvalidBind(String),

    #[error("invalid filename letter range: {0:?}")]
    InvalidLetterRange(String),
}

/// Ingest server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// TCP port (0 = OS-assigned).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Destination directory for stored files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Write buffer size per file.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Per-file ceiling for multipart parts.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Ceiling for a raw upload body.
    #[serde(default = "default_raw_max_file_size")]
    pub raw_max_file_size: u64,

    /// Ceiling for a whole multipart body.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: u64,

    /// Ceiling for the metadata part.
    #[serde(default = "default_max_metadata_size")]
    pub max_metadata_size: u64,

    /// Letters kept by the stored-name sanitizer in addition to ASCII,
    /// as `"start-end"` ranges or single characters.
    #[serde(default = "default_letter_ranges")]
    pub filename_letter_ranges: Vec<String>,

    /// Resident memory, in bytes, above which upload phases log a warning;
    /// zero turns sampling off.
    #[serde(default = "default_memory_warn_threshold")]
    pub memory_warn_threshold: u64,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOAD_DIR)
}

fn default_buffer_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_raw_max_file_size() -> u64 {
    DEFAULT_RAW_MAX_FILE_SIZE
}

fn default_max_request_size() -> u64 {
    DEFAULT_MAX_REQUEST_SIZE
}

fn default_max_metadata_size() -> u64 {
    64 * 1024
}

fn default_letter_ranges() -> Vec<String> {
    vec!["가-힣".into()]
}

fn default_memory_warn_threshold() -> u64 {
    DEFAULT_MEMORY_WARN_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            buffer_size: default_buffer_size(),
            max_file_size: default_max_file_size(),
            raw_max_file_size: default_raw_max_file_size(),
            max_request_size: default_max_request_size(),
            max_metadata_size: default_max_metadata_size(),
            filename_letter_ranges: default_letter_ranges(),
            memory_warn_threshold: default_memory_warn_threshold(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "server configuration loaded");
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.bind.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Builds the sanitizer policy from `filename_letter_ranges`.
    pub fn filename_policy(&self) -> Result<FilenamePolicy, ConfigError> {
        let ranges = self
            .filename_letter_ranges
            .iter()
            .map(|range| {
                FilenamePolicy::parse_range(range)
                    .ok_or_else(|| ConfigError::InvalidLetterRange(range.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FilenamePolicy::with_letters(ranges))
    }
}
