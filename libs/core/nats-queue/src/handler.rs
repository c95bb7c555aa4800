//! Handler trait invoked for each delivered envelope.

use crate::envelope::Envelope;
use crate::error::HandlerError;
use async_trait::async_trait;

/// Per-delivery processing hook.
///
/// Return `Ok(())` to acknowledge the delivery. Any error rejects it back
/// onto the queue for redelivery, without backoff and without a retry
/// ceiling, so handlers must be idempotent and should only fail on conditions
/// that can heal.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// A handler that acknowledges everything, for tests.
#[derive(Debug, Clone, Default)]
pub struct NoOpHandler;

#[async_trait]
impl Handler for NoOpHandler {
    async fn handle(&self, _envelope: &Envelope) -> Result<(), HandlerError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop_handler"
    }
}

/// A handler that rejects everything, for tests.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: String,
}

impl FailingHandler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(&self, _envelope: &Envelope) -> Result<(), HandlerError> {
        Err(HandlerError::new(&self.message))
    }

    fn name(&self) -> &'static str {
        "failing_handler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_acknowledges() {
        let envelope = Envelope::new(&"x", None).unwrap();
        assert!(NoOpHandler.handle(&envelope).await.is_ok());
    }

    #[tokio::test]
    async fn failing_rejects_with_its_message() {
        let envelope = Envelope::new(&"x", None).unwrap();
        let err = FailingHandler::new("nope").handle(&envelope).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
