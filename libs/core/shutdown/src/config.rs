//! Timing configuration for the shutdown sequence.

use service_config::{env_parse, ConfigError, FromEnv};
use std::time::Duration;

const DEFAULT_DELAY_MS: u64 = 5_000;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 2_000;

/// Timing knobs for [`crate::Coordinator::wait`].
#[derive(Clone, Debug)]
pub struct ShutdownConfig {
    /// Grace period between the shutdown trigger and the first callback,
    /// giving load balancers time to drain in-flight traffic.
    pub delay: Duration,

    /// Upper bound on the whole sequence, including the delay.
    pub wait_timeout: Duration,

    /// Individual time budget for each callback.
    pub callback_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            callback_timeout: Duration::from_millis(DEFAULT_CALLBACK_TIMEOUT_MS),
        }
    }
}

impl ShutdownConfig {
    /// A configuration with no grace delay, for tests and CLI tooling.
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl FromEnv for ShutdownConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            delay: Duration::from_millis(env_parse("SHUTDOWN_DELAY_MS", DEFAULT_DELAY_MS)?),
            wait_timeout: Duration::from_millis(env_parse(
                "SHUTDOWN_WAIT_TIMEOUT_MS",
                DEFAULT_WAIT_TIMEOUT_MS,
            )?),
            callback_timeout: Duration::from_millis(env_parse(
                "SHUTDOWN_CALLBACK_TIMEOUT_MS",
                DEFAULT_CALLBACK_TIMEOUT_MS,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.delay, Duration::from_secs(5));
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
        assert_eq!(config.callback_timeout, Duration::from_secs(2));
    }

    #[test]
    fn from_env_overrides_delay() {
        temp_env::with_var("SHUTDOWN_DELAY_MS", Some("250"), || {
            let config = ShutdownConfig::from_env().unwrap();
            assert_eq!(config.delay, Duration::from_millis(250));
            assert_eq!(config.wait_timeout, Duration::from_secs(10));
        });
    }

    #[test]
    fn from_env_rejects_garbage() {
        temp_env::with_var("SHUTDOWN_WAIT_TIMEOUT_MS", Some("soon"), || {
            assert!(ShutdownConfig::from_env().is_err());
        });
    }

    #[test]
    fn immediate_has_no_delay() {
        assert_eq!(ShutdownConfig::immediate().delay, Duration::ZERO);
    }
}
