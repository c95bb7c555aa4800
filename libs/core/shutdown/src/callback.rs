//! Cleanup callbacks and their timeout-bounded execution.

use crate::error::ShutdownError;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Error produced by a callback action.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The deferred cleanup work itself. Invoked at most once.
pub type CallbackAction =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CallbackError>> + Send + 'static>;

/// A named cleanup action executed during shutdown.
///
/// Both fields are public on purpose: a callback with an empty name or a
/// missing action is representable, and the violation surfaces as an error
/// when the callback executes, not when it is registered.
pub struct Callback {
    /// Descriptive name, used in logs and error attribution. Must be
    /// non-empty by the time the callback runs.
    pub name: String,

    /// The action to run. Must be present by the time the callback runs.
    pub action: Option<CallbackAction>,
}

impl Callback {
    /// Create a well-formed callback.
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Some(Box::new(move || Box::pin(action()))),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

/// Run a single callback with an individual timeout.
///
/// The action runs on its own task: when the timeout fires, the task is
/// abandoned rather than aborted, so the underlying work may still complete
/// in the background while the sequence moves on.
pub(crate) async fn execute(callback: Callback, timeout: Duration) -> Result<(), ShutdownError> {
    if callback.name.is_empty() {
        return Err(ShutdownError::UnnamedCallback);
    }
    let name = callback.name;

    let Some(action) = callback.action else {
        return Err(ShutdownError::MissingAction { name });
    };

    let task = tokio::spawn(action());
    match tokio::time::timeout(timeout, task).await {
        Err(_elapsed) => Err(ShutdownError::TimeoutExceeded),
        Ok(Err(_join)) => Err(ShutdownError::CallbackPanicked { name }),
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(source))) => Err(ShutdownError::Callback { name, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn successful_callback_returns_ok() {
        let callback = Callback::new("ok", || async { Ok(()) });
        assert!(execute(callback, TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn failing_callback_is_attributed_by_name() {
        let callback = Callback::new("flaky", || async { Err("connection reset".into()) });
        let err = execute(callback, TIMEOUT).await.unwrap_err();
        match err {
            ShutdownError::Callback { name, .. } => assert_eq!(name, "flaky"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_name_is_a_contract_violation() {
        let callback = Callback::new("", || async { Ok(()) });
        let err = execute(callback, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ShutdownError::UnnamedCallback));
    }

    #[tokio::test]
    async fn missing_action_is_a_contract_violation() {
        let callback = Callback {
            name: "no-op".to_string(),
            action: None,
        };
        let err = execute(callback, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ShutdownError::MissingAction { name } if name == "no-op"));
    }

    #[tokio::test]
    async fn overrunning_callback_times_out_but_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let callback = Callback::new("slow", move || async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let err = execute(callback, Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!finished.load(Ordering::SeqCst));

        // The abandoned task still completes in the background.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_callback_is_contained() {
        let callback = Callback::new("boom", || async { panic!("unexpected") });
        let err = execute(callback, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ShutdownError::CallbackPanicked { name } if name == "boom"));
    }
}
