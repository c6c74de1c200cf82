//! Core trait definitions

mod communicator;
mod task;

pub use communicator::Communicator;
pub use task::Task;
