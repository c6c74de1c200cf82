//! lc-producer: Producer side of logcast
//!
//! A producer publishes its log records to every consumer that discovered
//! and subscribed to it, and can additionally push records to one fixed
//! collector over a reconnecting TCP connection.

pub mod distributor;
pub mod layer;
pub mod writer;

pub use distributor::{Distributor, PublishError};
pub use layer::PublishLayer;
pub use writer::{Dial, ReconnectingWriter, TcpDialer, WriterError};
