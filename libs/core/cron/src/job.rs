//! The unit of work a runner executes.

use async_trait::async_trait;

/// Error returned by a job execution. Logged by the runner, never fatal.
pub type JobError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A periodic job.
///
/// Executions must be idempotent: the advisory lock makes concurrent runs
/// unlikely, not impossible (it is best-effort, and a stale lock can be
/// stolen while a slow holder is still working).
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self) -> Result<(), JobError>;
}
