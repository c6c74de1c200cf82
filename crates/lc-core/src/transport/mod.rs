//! Communicator implementations
//!
//! - [`UdpCommunicator`]: one UDP socket, one receive loop, a bounded inbound
//!   queue and a small pool of dispatch workers
//! - `MemoryLink`: in-process communicator that records what it sends, built
//!   for tests and with the `test-util` feature

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod udp;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryLink;
pub use udp::{bind_random, UdpCommunicator};
