//! Point-to-point writer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Default number of reconnection retries
pub const DEFAULT_MAX_RECONNECT: u32 = 3;

/// Default delay before each redial
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the reconnecting GELF writer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// `host:port` of the remote collector
    pub address: String,

    /// Redial budget per write is `max_reconnect + 1` attempts
    pub max_reconnect: u32,

    /// Sleep before each redial
    #[serde(with = "duration_millis")]
    pub reconnect_delay: Duration,

    /// Facility stamped on records (defaults to the program name)
    pub facility: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:12201".to_string(),
            max_reconnect: DEFAULT_MAX_RECONNECT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            facility: None,
        }
    }
}
