//! lc-core: Core abstractions and configuration for logcast
//!
//! This crate provides the shared types, configuration structures, errors
//! and runtime building blocks (communicator, dispatcher, task registry,
//! object pool, file sink) used by the producer and consumer crates.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod pool;
pub mod process;
pub mod record;
pub mod registry;
pub mod sink;
pub mod time;
pub mod traits;
pub mod transport;
pub mod types;

pub use dispatch::{Dispatcher, Inbound};
pub use error::{LogcastError, TaskError, TransportError};
pub use record::LogRecord;
pub use registry::{TaskOptions, TaskRegistry};
pub use traits::{Communicator, Task};
pub use types::{Credential, PeerIdentity, PortRange, Severity};
