//! Periodic task trait

use async_trait::async_trait;
use std::any::Any;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Unit of periodic work driven by a [`TaskRegistry`](crate::registry::TaskRegistry)
///
/// `init` runs once before the task becomes visible, `run_once` on every
/// registry tick, and `destroy` exactly once when the task leaves the
/// registry, for whatever reason.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Prepare the task; an error keeps it out of the registry
    async fn init(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// One unit of work
    async fn run_once(&self, cancel: &CancellationToken) -> Result<(), TaskError>;

    /// Release resources
    async fn destroy(&self) {}

    /// Opaque per-task data for callers that only see `dyn Task`
    fn user_data(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }
}
