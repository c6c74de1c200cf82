//! Core domain types

use lc_protocol::{InfoRequest, SubscribeRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Shared static credential checked on discovery and subscribe requests.
///
/// Not per-session and never rotated; it keeps strangers from attaching by
/// accident, nothing more.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub name: String,
    pub password: String,
}

impl Credential {
    /// Create a credential
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    /// Check a presented name/password pair
    pub fn verify(&self, name: &str, password: &str) -> bool {
        self.name == name && self.password == password
    }

    /// Discovery probe carrying this credential
    pub fn info_request(&self) -> InfoRequest {
        InfoRequest {
            name: self.name.clone(),
            password: self.password.clone(),
        }
    }

    /// Subscribe request (or heartbeat) for `facility`
    pub fn subscribe_request(&self, facility: &str) -> SubscribeRequest {
        SubscribeRequest {
            name: self.name.clone(),
            password: self.password.clone(),
            facility: facility.to_string(),
        }
    }
}

impl Default for Credential {
    fn default() -> Self {
        Self::new("logcast", "logcast123456")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Contiguous range of UDP ports, `start..start + count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub count: u16,
}

impl PortRange {
    /// Create a port range
    pub fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    /// Iterate the ports, stopping at 65535
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        let end = (self.start as u32 + self.count as u32).min(u16::MAX as u32 + 1);
        (self.start as u32..end).map(|p| p as u16)
    }

    /// Number of usable ports
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if the range holds no port
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether `port` falls inside the range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && ((port - self.start) as u32) < self.count as u32
    }

    /// The `index`-th port, if inside the range
    pub fn nth(&self, index: usize) -> Option<u16> {
        self.iter().nth(index)
    }

    /// Every `ip:port` address in the range
    pub fn addrs(&self, ip: IpAddr) -> impl Iterator<Item = SocketAddr> {
        self.iter().map(move |port| SocketAddr::new(ip, port))
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start,
            self.start as u32 + self.count as u32
        )
    }
}

/// Log severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    /// Numeric value carried on the wire
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Convert from the wire value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Debug),
            1 => Some(Self::Info),
            2 => Some(Self::Warning),
            3 => Some(Self::Error),
            4 => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Upper-case label
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Syslog level used by GELF
    pub fn syslog_level(&self) -> u8 {
        match self {
            Severity::Debug => 7,
            Severity::Info => 6,
            Severity::Warning => 4,
            Severity::Error => 3,
            Severity::Fatal => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// A peer as seen by the protocol: where it is and which facility it serves
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    pub addr: SocketAddr,
    pub facility: String,
}

impl PeerIdentity {
    /// Create a peer identity
    pub fn new(addr: SocketAddr, facility: impl Into<String>) -> Self {
        Self {
            addr,
            facility: facility.into(),
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.facility, self.addr)
    }
}
