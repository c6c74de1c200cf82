//! Local log file configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how large local log files get
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Preferred directory for log files; the current directory is the fallback
    pub log_dir: PathBuf,
    /// Rotate once a file grows past this many MiB
    pub max_size_mb: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./"),
            max_size_mb: 1800,
        }
    }
}

impl SinkConfig {
    /// Rotation threshold in bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}
