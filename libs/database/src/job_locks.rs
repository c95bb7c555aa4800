//! Advisory-lock repository backing the distributed cron runner.
//!
//! One row per job name. Acquisition is a single atomic upsert: an insert
//! wins unconditionally when no row exists, and the conflict branch only
//! touches rows whose `locked_at` is older than the staleness window, which
//! lets any instance steal a lock whose holder crashed mid-job.

use async_trait::async_trait;
use cron_runner::{JobLocker, LockError};
use sqlx::PgPool;

pub struct PgJobLocker {
    pool: PgPool,
}

impl PgJobLocker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLocker for PgJobLocker {
    async fn lock(&self, job_name: &str) -> Result<bool, LockError> {
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
INSERT INTO job_locks (job_name, locked_at)
VALUES ($1, NOW())
ON CONFLICT (job_name)
DO UPDATE SET locked_at = NOW()
WHERE job_locks.locked_at < NOW() - INTERVAL '1 minute'
RETURNING job_name
"#,
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;

        // No row touched means the lock is held and fresh.
        Ok(acquired.is_some())
    }

    async fn unlock(&self, job_name: &str) -> Result<(), LockError> {
        sqlx::query("DELETE FROM job_locks WHERE job_name = $1")
            .bind(job_name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
