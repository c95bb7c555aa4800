//! In-process lock store with the same staleness semantics as the SQL one.
//!
//! Useful for tests and for single-instance deployments where a database
//! round-trip per tick buys nothing.

use crate::locker::{JobLocker, LockError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_STALENESS: Duration = Duration::from_secs(60);

pub struct MemoryJobLocker {
    staleness: Duration,
    locks: Mutex<HashMap<String, Instant>>,
}

impl MemoryJobLocker {
    pub fn new() -> Self {
        Self::with_staleness(DEFAULT_STALENESS)
    }

    /// Override the window after which an unreleased lock may be stolen.
    pub fn with_staleness(staleness: Duration) -> Self {
        Self {
            staleness,
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobLocker for MemoryJobLocker {
    async fn lock(&self, job_name: &str) -> Result<bool, LockError> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        match locks.get(job_name) {
            Some(acquired_at) if acquired_at.elapsed() < self.staleness => Ok(false),
            // Absent, or stale enough to steal.
            _ => {
                locks.insert(job_name.to_string(), Instant::now());
                Ok(true)
            }
        }
    }

    async fn unlock(&self, job_name: &str) -> Result<(), LockError> {
        self.locks
            .lock()
            .expect("lock table poisoned")
            .remove(job_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn lock_on_empty_store_succeeds_and_blocks_the_next() {
        let locker = MemoryJobLocker::new();
        assert!(locker.lock("nightly").await.unwrap());
        assert!(!locker.lock("nightly").await.unwrap());
    }

    #[tokio::test]
    async fn unlock_frees_the_name_and_tolerates_noop() {
        let locker = MemoryJobLocker::new();
        assert!(locker.lock("nightly").await.unwrap());
        locker.unlock("nightly").await.unwrap();
        assert!(locker.lock("nightly").await.unwrap());

        // Releasing an unheld lock is a no-op.
        locker.unlock("unheld").await.unwrap();
    }

    #[tokio::test]
    async fn stale_lock_is_stolen_after_the_window() {
        let locker = MemoryJobLocker::with_staleness(Duration::from_millis(40));
        assert!(locker.lock("nightly").await.unwrap());
        assert!(!locker.lock("nightly").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(locker.lock("nightly").await.unwrap());
    }

    #[tokio::test]
    async fn different_jobs_do_not_contend() {
        let locker = MemoryJobLocker::new();
        assert!(locker.lock("nightly").await.unwrap());
        assert!(locker.lock("hourly").await.unwrap());
    }

    #[tokio::test]
    async fn exactly_one_of_two_racing_instances_acquires() {
        let locker = Arc::new(MemoryJobLocker::new());
        let (a, b) = tokio::join!(
            {
                let locker = locker.clone();
                async move { locker.lock("nightly").await.unwrap() }
            },
            {
                let locker = locker.clone();
                async move { locker.lock("nightly").await.unwrap() }
            }
        );
        assert!(a ^ b, "exactly one instance must win the lock");
    }
}
