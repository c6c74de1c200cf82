//! Consumer error types

use lc_core::error::{ConfigError, TransportError};
use thiserror::Error;

/// Errors setting up a discovery manager
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Socket could not be bound
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
