//! Connection establishment

use std::io::{self, Write};
use std::net::TcpStream;

/// Opens connections to the collector
pub trait Dial: Send + Sync {
    /// Connection type
    type Conn: Write + Send;

    /// Open a new connection
    fn dial(&self) -> io::Result<Self::Conn>;

    /// Where connections go, for error messages
    fn address(&self) -> &str;
}

/// Plain TCP dialer
#[derive(Debug, Clone)]
pub struct TcpDialer {
    address: String,
}

impl TcpDialer {
    /// Dialer for `host:port`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Dial for TcpDialer {
    type Conn = TcpStream;

    fn dial(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(self.address.as_str())?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn address(&self) -> &str {
        &self.address
    }
}
