//! Core error types for logcast

use lc_protocol::ProtocolError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the logcast ecosystem
#[derive(Error, Debug)]
pub enum LogcastError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Task error
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Log file sink error
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Communicator errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Every bind attempt in a port range failed
    #[error("No available port in {range} after {attempts} attempts")]
    NoAvailablePort { range: String, attempts: usize },

    /// Datagram could not be sent
    #[error("Send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Message could not be encoded
    #[error("Encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    /// Communicator already closed
    #[error("Communicator closed")]
    Closed,
}

/// Errors reported by periodic tasks
#[derive(Error, Debug)]
pub enum TaskError {
    /// Peer stopped answering heartbeats
    #[error("{addr} no response for {silent_for:?}")]
    PeerSilent {
        addr: SocketAddr,
        silent_for: Duration,
    },

    /// Task could not reach its peer
    #[error("Send failed: {0}")]
    Send(#[from] TransportError),

    /// Task refused to initialize
    #[error("Init failed: {0}")]
    Init(String),
}

/// Task registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A task is already registered under this key
    #[error("Task already registered: {0}")]
    AlreadyRegistered(String),

    /// Task init failed, nothing registered
    #[error("Task init failed: {0}")]
    Init(#[source] TaskError),
}

/// Log file sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// No candidate directory configured
    #[error("No log directories")]
    NoLogDirs,

    /// Every candidate directory failed
    #[error("Cannot create log file {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
