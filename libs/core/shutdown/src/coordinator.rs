//! The shutdown coordinator itself.

use crate::callback::{self, Callback, CallbackError};
use crate::config::ShutdownConfig;
use crate::error::ShutdownError;
use crate::signal::SignalSource;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A signal landing inside this window after shutdown began is assumed to be
/// delivery latency of the *first* signal, not an operator escalating.
const FORCE_DEBOUNCE: Duration = Duration::from_millis(250);

/// Coordinates graceful termination of the whole process.
///
/// One instance is constructed at the composition root and handed (cloned) to
/// every component that registers cleanup work or needs a cancellation token.
/// Cloning is cheap; all clones share the same state.
///
/// There is deliberately no global instance: tests get isolation by
/// constructing a fresh coordinator instead of resetting shared state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    /// Callbacks registered by application code.
    user_callbacks: Mutex<Vec<Callback>>,
    /// Callbacks installed internally, e.g. cancellation of derived tokens.
    system_callbacks: Mutex<Vec<Callback>>,
    shutting_down: AtomicBool,
    trigger: watch::Sender<bool>,
    force: Notify,
    started_at: OnceLock<Instant>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (trigger, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                user_callbacks: Mutex::new(Vec::new()),
                system_callbacks: Mutex::new(Vec::new()),
                shutting_down: AtomicBool::new(false),
                trigger,
                force: Notify::new(),
                started_at: OnceLock::new(),
            }),
        }
    }

    /// Register a named cleanup action.
    ///
    /// Never blocks beyond the registry lock and performs no validation;
    /// malformed callbacks are reported when they execute. Duplicate names
    /// are permitted and run independently.
    pub fn register<F, Fut>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        self.register_callback(Callback::new(name, action));
    }

    /// Register a pre-built [`Callback`].
    pub fn register_callback(&self, callback: Callback) {
        self.inner
            .user_callbacks
            .lock()
            .expect("callback registry poisoned")
            .push(callback);
    }

    fn register_system_callback(&self, callback: Callback) {
        self.inner
            .system_callbacks
            .lock()
            .expect("callback registry poisoned")
            .push(callback);
    }

    /// Derive a fresh [`CancellationToken`] that is cancelled during the
    /// shutdown sequence.
    ///
    /// The cancellation is installed as a *system* callback, so it fires
    /// before any user callback registered earlier: loops driven by the
    /// token stop before the resources they use are torn down.
    pub fn derive_token(&self) -> tokio_util::sync::CancellationToken {
        self.derive_child_token(&tokio_util::sync::CancellationToken::new())
    }

    /// Like [`Coordinator::derive_token`], but the returned token is a child
    /// of `parent` and is also cancelled whenever the parent is.
    pub fn derive_child_token(
        &self,
        parent: &tokio_util::sync::CancellationToken,
    ) -> tokio_util::sync::CancellationToken {
        let token = parent.child_token();
        let cancel = token.clone();
        self.register_system_callback(Callback::new("context-cancellation", move || async move {
            cancel.cancel();
            Ok(())
        }));
        token
    }

    /// Begin shutdown. Idempotent and safe to call concurrently with
    /// registration; only the first call has any effect.
    pub fn trigger_shutdown(&self) {
        if self
            .inner
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.inner.started_at.set(Instant::now());
            // send_replace stores the value even when nobody subscribed yet.
            self.inner.trigger.send_replace(true);
        }
    }

    /// Non-blocking status read.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Wire a [`SignalSource`] to this coordinator.
    ///
    /// The first signal triggers shutdown. A later signal arriving at least
    /// 250 ms after shutdown began escalates to a forced shutdown; anything
    /// inside that window is treated as latency of the first signal and
    /// dropped.
    pub fn listen<S: SignalSource>(&self, mut signals: S) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while signals.recv().await.is_some() {
                if !coordinator.is_shutting_down() {
                    info!("Termination signal received, initiating graceful shutdown");
                    coordinator.trigger_shutdown();
                    continue;
                }

                let past_debounce = coordinator
                    .inner
                    .started_at
                    .get()
                    .is_some_and(|started| started.elapsed() >= FORCE_DEBOUNCE);
                if past_debounce {
                    warn!("Second termination signal received, forcing shutdown");
                    coordinator.inner.force.notify_one();
                } else {
                    debug!("Ignoring termination signal inside the debounce window");
                }
            }
        })
    }

    /// Block until shutdown is triggered, then run the cleanup sequence.
    ///
    /// Callbacks are consumed exactly once and executed in reverse
    /// registration order, system group first, each under
    /// `config.callback_timeout`. A failing callback never stops the
    /// sequence; the first error is retained and returned at the end.
    ///
    /// Returns [`ShutdownError::ForceShutdown`] as soon as an escalation is
    /// observed and [`ShutdownError::TimeoutExceeded`] once
    /// `config.wait_timeout` elapses, in that priority, regardless of how far
    /// cleanup has progressed. The cleanup task itself is left running in
    /// either case; only the waiting stops.
    pub async fn wait(&self, config: &ShutdownConfig) -> Result<(), ShutdownError> {
        let mut trigger_rx = self.inner.trigger.subscribe();
        if !*trigger_rx.borrow() {
            let _ = trigger_rx.wait_for(|triggered| *triggered).await;
        }

        info!("Shutdown signal received, initiating graceful shutdown");

        // User callbacks first, system callbacks appended; reversed below so
        // the execution order is system (newest first), then user (newest
        // first).
        let mut callbacks = {
            let mut user = self
                .inner
                .user_callbacks
                .lock()
                .expect("callback registry poisoned");
            let mut system = self
                .inner
                .system_callbacks
                .lock()
                .expect("callback registry poisoned");
            let mut combined: Vec<Callback> = user.drain(..).collect();
            combined.extend(system.drain(..));
            combined
        };

        let delay = config.delay;
        let callback_timeout = config.callback_timeout;
        let mut cleanup = tokio::spawn(async move {
            if !delay.is_zero() {
                info!(delay_ms = delay.as_millis() as u64, "Delaying before shutdown callbacks");
                tokio::time::sleep(delay).await;
            }

            let mut first_error: Option<ShutdownError> = None;
            for callback in callbacks.drain(..).rev() {
                let name = callback.name.clone();
                debug!(callback = %name, "Executing shutdown callback");
                match callback::execute(callback, callback_timeout).await {
                    Ok(()) => debug!(callback = %name, "Shutdown callback completed"),
                    Err(err) => {
                        warn!(callback = %name, error = %err, "Shutdown callback failed");
                        first_error.get_or_insert(err);
                    }
                }
            }
            first_error
        });

        tokio::select! {
            biased;

            _ = self.inner.force.notified() => {
                warn!("Force shutdown signal received");
                Err(ShutdownError::ForceShutdown)
            }
            _ = tokio::time::sleep(config.wait_timeout) => {
                warn!("Shutdown wait timeout exceeded");
                Err(ShutdownError::TimeoutExceeded)
            }
            outcome = &mut cleanup => match outcome {
                Ok(Some(err)) => Err(err),
                Ok(None) => {
                    info!("Graceful shutdown completed");
                    Ok(())
                }
                // The cleanup task only fails to join while the runtime is
                // tearing down; report it as an exceeded wait.
                Err(_) => Err(ShutdownError::TimeoutExceeded),
            },
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
