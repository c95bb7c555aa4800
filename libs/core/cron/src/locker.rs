//! The advisory-lock boundary the runner coordinates through.

use async_trait::async_trait;

/// Error from the lock store itself. A held lock is not an error; it is the
/// `Ok(false)` outcome of [`JobLocker::lock`].
pub type LockError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One row per job name with a last-acquired timestamp.
///
/// Contract:
/// - `lock` succeeds when no row exists for the name, or when the existing
///   row is older than the store's staleness window (an abandoned lock may
///   be stolen by any instance).
/// - `unlock` deletes the row and tolerates a no-op when it is already gone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobLocker: Send + Sync {
    /// Try to acquire the lock. `Ok(true)` means this instance holds it.
    async fn lock(&self, job_name: &str) -> Result<bool, LockError>;

    /// Release the lock, whether or not this instance still holds it.
    async fn unlock(&self, job_name: &str) -> Result<(), LockError>;
}
