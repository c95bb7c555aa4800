//! JetStream-backed queue client with manual acknowledgment.
//!
//! One broker connection is multiplexed into independently failing publish
//! and consume paths per queue:
//!
//! ```text
//! QueueClient (one connection)
//!   └── queue "send-schedule"
//!         ├── producer pool: N publish contexts, atomic round-robin
//!         └── consumer pool: M consume loops, each with its own
//!             message stream and stop token
//! ```
//!
//! Delivery contract (at-least-once):
//! - handler succeeds        → acknowledge
//! - handler fails           → reject with requeue (unbounded redelivery)
//! - envelope fails to decode → reject **without** requeue; the poison
//!   message is dropped and the handler never sees it
//!
//! A fault inside one consume loop ends that loop only; siblings and the
//! process keep running.

mod client;
mod config;
mod envelope;
mod error;
mod handler;
pub mod metrics;

pub use client::QueueClient;
pub use config::{NatsConfig, QueueConfig};
pub use envelope::Envelope;
pub use error::{HandlerError, QueueError};
pub use handler::{FailingHandler, Handler, NoOpHandler};
