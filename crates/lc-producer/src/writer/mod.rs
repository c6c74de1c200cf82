//! Point-to-point delivery to a fixed collector

mod dial;
mod reconnect;

pub use dial::{Dial, TcpDialer};
pub use reconnect::{ReconnectingWriter, WriterError};
