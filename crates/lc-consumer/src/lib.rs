//! lc-consumer: Consumer side of logcast
//!
//! A consumer probes a host's producer port range, subscribes to every
//! producer serving the wanted facility and keeps each subscription alive
//! with heartbeats. Producers that stop answering are dropped and the host
//! is probed again.

pub mod discovery;
pub mod error;
pub mod liveness;

pub use discovery::DiscoveryManager;
pub use error::ConsumerError;
pub use liveness::{HeartbeatAction, PeerLiveness};
