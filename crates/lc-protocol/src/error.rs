//! Protocol error types

use thiserror::Error;

use crate::message::MessageKind;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown message kind
    #[error("Unknown message kind: {0:#04x}")]
    UnknownMessageKind(u8),

    /// Header announces one kind, payload decodes as another
    #[error("Message kind mismatch: header says {header:?}, payload is {payload:?}")]
    KindMismatch {
        header: MessageKind,
        payload: MessageKind,
    },

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Incomplete frame received
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// Trailing bytes after a complete datagram frame
    #[error("Trailing data: {0} bytes after frame")]
    TrailingData(usize),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// GELF document encoding error
    #[error("GELF encoding error: {0}")]
    Gelf(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
