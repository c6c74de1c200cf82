//! Communicator sizing

use serde::{Deserialize, Serialize};

/// Queue and worker sizing of a UDP communicator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Inbound messages buffered between the socket and the handlers
    pub queue_size: usize,
    /// Number of handler workers draining the inbound queue
    pub workers: usize,
    /// Receive buffer size; larger datagrams are truncated and dropped
    pub max_datagram: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            workers: 4,
            max_datagram: 65_507,
        }
    }
}
