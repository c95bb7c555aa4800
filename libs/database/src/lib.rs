//! PostgreSQL plumbing for the runtime: connection pool configuration and
//! the advisory-lock repository backing the distributed cron runner.

pub mod job_locks;
pub mod postgres;

pub use job_locks::PgJobLocker;
pub use postgres::{connect, connect_with_retry, PostgresConfig};

/// Embedded schema migrations (`migrations/`).
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
