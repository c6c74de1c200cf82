//! Communicator trait

use async_trait::async_trait;
use lc_protocol::Message;
use std::net::SocketAddr;

use crate::error::TransportError;

/// Abstraction over a bound datagram endpoint
///
/// Producers and consumers only ever talk through this trait, so the
/// handlers and tasks built on top can be driven by an in-memory double in
/// tests.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Encode `message` and send it to `addr`
    async fn send(&self, addr: SocketAddr, message: &Message) -> Result<(), TransportError>;

    /// Address the endpoint is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Stop sending; later sends fail with [`TransportError::Closed`]
    async fn close(&self);
}
