//! Graceful shutdown coordination for a fleet of stateless service instances.
//!
//! Every long-lived component registers a named cleanup callback with the
//! [`Coordinator`] and/or derives a [`CancellationToken`] from it. When a
//! termination signal arrives (or [`Coordinator::trigger_shutdown`] is
//! called), [`Coordinator::wait`] runs the callbacks in reverse registration
//! order, newest first, system callbacks before user callbacks, each under
//! its own timeout.
//!
//! ## Shutdown sequence
//!
//! ```text
//! SIGTERM/SIGINT ──▶ trigger ──▶ delay ──▶ callbacks (reverse order) ──▶ done
//!                                  │
//!                                  ├── second signal after 250ms ──▶ ForceShutdown
//!                                  └── wait_timeout elapsed       ──▶ TimeoutExceeded
//! ```
//!
//! A callback that overruns its timeout is abandoned (its task keeps
//! running, only the result is discarded) so one stuck cleanup cannot stall
//! the rest of the sequence.
//!
//! ## Example
//!
//! ```ignore
//! let coordinator = Coordinator::new();
//! coordinator.listen(TerminationSignals::new()?);
//!
//! let token = coordinator.derive_token();
//! coordinator.register("queue-client", move || async move { queue.close().await });
//!
//! // ... start the application against `token` ...
//!
//! coordinator.wait(&ShutdownConfig::from_env()?).await?;
//! ```

mod callback;
mod config;
mod coordinator;
mod error;
mod signal;

pub use callback::{Callback, CallbackAction, CallbackError};
pub use config::ShutdownConfig;
pub use coordinator::Coordinator;
pub use error::ShutdownError;
pub use signal::{SignalSource, TerminationSignals};
