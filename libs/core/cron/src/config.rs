//! Runner configuration.

use service_config::{env_parse, env_required, ConfigError, FromEnv};
use std::time::Duration;

const DEFAULT_PERIOD_SECS: u64 = 3_600;

#[derive(Clone, Debug)]
pub struct CronConfig {
    /// Name of the advisory lock row; shared by every instance running the
    /// same job.
    pub job_name: String,

    /// Fixed repetition period.
    pub period: Duration,
}

impl CronConfig {
    pub fn new(job_name: impl Into<String>, period: Duration) -> Self {
        Self {
            job_name: job_name.into(),
            period,
        }
    }
}

impl FromEnv for CronConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            job_name: env_required("CRON_JOB_NAME")?,
            period: Duration::from_secs(env_parse("CRON_PERIOD_SECS", DEFAULT_PERIOD_SECS)?),
        })
    }
}
