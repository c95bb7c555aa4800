//! The periodic runner driving lock-gated job executions.

use crate::job::Job;
use crate::locker::JobLocker;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs a [`Job`] every `period`, cluster-wide at most once per tick.
pub struct Runner<J, L>
where
    J: Job,
    L: JobLocker,
{
    job: Arc<J>,
    locker: Arc<L>,
    job_name: String,
    period: Duration,
}

impl<J, L> Runner<J, L>
where
    J: Job,
    L: JobLocker,
{
    pub fn new(job: Arc<J>, locker: Arc<L>, job_name: impl Into<String>, period: Duration) -> Self {
        Self {
            job,
            locker,
            job_name: job_name.into(),
            period,
        }
    }

    /// Tick until `token` is cancelled.
    ///
    /// Fires immediately on start, then on every period boundary.
    /// Cancellation stops future scheduling only; a tick already in progress
    /// runs to completion, including its unlock.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(job = %self.job_name, period_secs = self.period.as_secs(), "Cron runner started");
        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    info!(job = %self.job_name, "Cron runner stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            self.run_once().await;
        }
    }

    /// One tick: attempt the lock, run the job if acquired, always release.
    async fn run_once(&self) {
        let acquired = match self.locker.lock(&self.job_name).await {
            Ok(acquired) => acquired,
            Err(err) => {
                error!(job = %self.job_name, error = %err, "Failed to acquire job lock");
                return;
            }
        };
        if !acquired {
            debug!(job = %self.job_name, "Job is already running elsewhere, skipping tick");
            return;
        }

        match AssertUnwindSafe(self.job.execute()).catch_unwind().await {
            Ok(Ok(())) => debug!(job = %self.job_name, "Job completed"),
            Ok(Err(err)) => error!(job = %self.job_name, error = %err, "Job failed"),
            Err(_panic) => error!(job = %self.job_name, "Panic in cron job"),
        }

        // Release regardless of the job's outcome.
        if let Err(err) = self.locker.unlock(&self.job_name).await {
            error!(job = %self.job_name, error = %err, "Failed to release job lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobError;
    use crate::locker::MockJobLocker;
    use crate::memory::MemoryJobLocker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
        outcome: fn() -> Result<(), JobError>,
    }

    impl CountingJob {
        fn succeeding() -> Self {
            Self {
                runs: AtomicUsize::new(0),
                outcome: || Ok(()),
            }
        }

        fn failing() -> Self {
            Self {
                runs: AtomicUsize::new(0),
                outcome: || Err("schedule fetch failed".into()),
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn execute(&self) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        async fn execute(&self) -> Result<(), JobError> {
            panic!("unexpected")
        }
    }

    #[tokio::test]
    async fn acquired_lock_runs_the_job_and_releases() {
        let mut locker = MockJobLocker::new();
        locker
            .expect_lock()
            .withf(|name| name == "nightly")
            .times(1)
            .returning(|_| Ok(true));
        locker
            .expect_unlock()
            .withf(|name| name == "nightly")
            .times(1)
            .returning(|_| Ok(()));

        let job = Arc::new(CountingJob::succeeding());
        let runner = Runner::new(job.clone(), Arc::new(locker), "nightly", Duration::from_secs(60));

        runner.run_once().await;
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test]
    async fn denied_lock_skips_the_tick_without_unlocking() {
        let mut locker = MockJobLocker::new();
        locker.expect_lock().times(1).returning(|_| Ok(false));
        // No expect_unlock: releasing a lock we never held would be a bug.

        let job = Arc::new(CountingJob::succeeding());
        let runner = Runner::new(job.clone(), Arc::new(locker), "nightly", Duration::from_secs(60));

        runner.run_once().await;
        assert_eq!(job.runs(), 0);
    }

    #[tokio::test]
    async fn lock_store_error_skips_the_tick() {
        let mut locker = MockJobLocker::new();
        locker
            .expect_lock()
            .times(1)
            .returning(|_| Err("connection refused".into()));

        let job = Arc::new(CountingJob::succeeding());
        let runner = Runner::new(job.clone(), Arc::new(locker), "nightly", Duration::from_secs(60));

        runner.run_once().await;
        assert_eq!(job.runs(), 0);
    }

    #[tokio::test]
    async fn failing_job_still_releases_the_lock() {
        let mut locker = MockJobLocker::new();
        locker.expect_lock().times(1).returning(|_| Ok(true));
        locker.expect_unlock().times(1).returning(|_| Ok(()));

        let job = Arc::new(CountingJob::failing());
        let runner = Runner::new(job.clone(), Arc::new(locker), "nightly", Duration::from_secs(60));

        runner.run_once().await;
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test]
    async fn panicking_job_is_contained_and_still_releases() {
        let mut locker = MockJobLocker::new();
        locker.expect_lock().times(1).returning(|_| Ok(true));
        locker.expect_unlock().times(1).returning(|_| Ok(()));

        let runner = Runner::new(
            Arc::new(PanickingJob),
            Arc::new(locker),
            "nightly",
            Duration::from_secs(60),
        );

        // Must return normally despite the panic inside the job.
        runner.run_once().await;
    }

    #[tokio::test]
    async fn unlock_failure_is_logged_not_fatal() {
        let mut locker = MockJobLocker::new();
        locker.expect_lock().times(1).returning(|_| Ok(true));
        locker
            .expect_unlock()
            .times(1)
            .returning(|_| Err("connection reset".into()));

        let job = Arc::new(CountingJob::succeeding());
        let runner = Runner::new(job.clone(), Arc::new(locker), "nightly", Duration::from_secs(60));

        runner.run_once().await;
        assert_eq!(job.runs(), 1);
    }

    #[tokio::test]
    async fn fires_immediately_then_stops_on_cancellation() {
        let job = Arc::new(CountingJob::succeeding());
        let locker = Arc::new(MemoryJobLocker::new());
        let runner = Arc::new(Runner::new(
            job.clone(),
            locker,
            "nightly",
            Duration::from_secs(60),
        ));

        let token = CancellationToken::new();
        let handle = {
            let runner = runner.clone();
            let token = token.clone();
            tokio::spawn(async move { runner.run(token).await })
        };

        // The first tick happens without waiting for the period.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(job.runs(), 1);

        token.cancel();
        handle.await.unwrap();
        assert_eq!(job.runs(), 1);
    }
}
