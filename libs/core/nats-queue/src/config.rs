//! Broker and per-queue configuration.

use service_config::{env_or_default, env_parse, ConfigError, FromEnv};

const DEFAULT_URL: &str = "nats://localhost:4222";
const DEFAULT_POOL_SIZE: usize = 4;

/// Connection settings for the broker.
#[derive(Clone, Debug)]
pub struct NatsConfig {
    /// Broker URL, e.g. `nats://localhost:4222`.
    pub url: String,

    /// Refuse to connect without TLS.
    pub require_tls: bool,
}

impl NatsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            require_tls: false,
        }
    }
}

impl FromEnv for NatsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("NATS_URL", DEFAULT_URL),
            require_tls: env_parse("NATS_REQUIRE_TLS", false)?,
        })
    }
}

/// Shape of one queue: its name and the size of each channel pool.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Queue name; doubles as the stream name and subject.
    pub name: String,

    /// Number of pooled publish channels.
    pub producer_count: usize,

    /// Number of independent consume loops.
    pub consumer_count: usize,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            producer_count: DEFAULT_POOL_SIZE,
            consumer_count: DEFAULT_POOL_SIZE,
        }
    }

    pub fn with_pool_sizes(mut self, producers: usize, consumers: usize) -> Self {
        self.producer_count = producers;
        self.consumer_count = consumers;
        self
    }

    /// Load pool sizes for a named queue from `<PREFIX>_PRODUCERS` /
    /// `<PREFIX>_CONSUMERS`.
    pub fn from_env_prefixed(name: impl Into<String>, prefix: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.into(),
            producer_count: env_parse(&format!("{prefix}_PRODUCERS"), DEFAULT_POOL_SIZE)?,
            consumer_count: env_parse(&format!("{prefix}_CONSUMERS"), DEFAULT_POOL_SIZE)?,
        })
    }
}
