//! Error types for the queue client.

use thiserror::Error;

/// Transport-level failure, propagated synchronously to the caller with the
/// failing operation's context.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Broker connection failed
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// Stream or consumer management failed
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Consume-side failure
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Publish-side failure
    #[error("Publish error: {0}")]
    Publish(String),

    /// Envelope serialization failed before publishing
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `send` was called for a queue that was never defined
    #[error("Queue not defined: {0}")]
    QueueNotDefined(String),

    /// A consume loop did not confirm its exit within the close timeout
    #[error("Consumer loop for queue '{queue}' did not stop in time")]
    ConsumerStalled { queue: String },

    /// Flushing or draining the connection failed during close
    #[error("Close error: {0}")]
    Close(String),
}

impl QueueError {
    /// Wrap a JetStream management error.
    pub fn from_jetstream_error(error: impl std::fmt::Display) -> Self {
        Self::JetStream(error.to_string())
    }

    /// Wrap a consume-side error.
    pub fn consumer_error(error: impl std::fmt::Display) -> Self {
        Self::Consumer(error.to_string())
    }

    /// Wrap a publish-side error.
    pub fn publish_error(error: impl std::fmt::Display) -> Self {
        Self::Publish(error.to_string())
    }

    /// Wrap a connection-close error.
    pub fn close_error(error: impl std::fmt::Display) -> Self {
        Self::Close(error.to_string())
    }
}

/// Opaque failure returned by a [`crate::Handler`].
///
/// Any handler error triggers reject-with-requeue; the client does not
/// inspect it beyond logging.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_carries_its_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = HandlerError::with_source("upstream call failed", io);
        assert_eq!(err.to_string(), "upstream call failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn queue_not_defined_names_the_queue() {
        let err = QueueError::QueueNotDefined("send-schedule".to_string());
        assert!(err.to_string().contains("send-schedule"));
    }
}
