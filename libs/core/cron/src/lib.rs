//! Distributed cron: run one idempotent job on a fixed period such that at
//! most one instance across the fleet executes it per tick.
//!
//! Coordination happens through an expiring advisory lock (the [`JobLocker`]
//! boundary), not through in-process state: every instance ticks on the same
//! period, attempts the lock, and silently skips the tick when another
//! instance holds it. A lock older than the store's staleness window counts
//! as abandoned and may be stolen, so a holder that crashed mid-job cannot
//! wedge the fleet.
//!
//! ```text
//! Idle ──▶ LockAttempt ──▶ Skipped ──▶ Idle
//!                    └───▶ Running ──▶ Unlocking ──▶ Idle
//! ```

mod config;
mod job;
mod locker;
mod memory;
mod runner;

pub use config::CronConfig;
pub use job::{Job, JobError};
pub use locker::{JobLocker, LockError};
pub use memory::MemoryJobLocker;
pub use runner::Runner;
