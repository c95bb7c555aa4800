//! Queue delivery counters, recorded through the `metrics` facade.
//!
//! The process decides whether and how to export them; without an installed
//! recorder these are no-ops.

use metrics::counter;

pub fn message_published(queue: &str) {
    counter!("queue_messages_published_total", "queue" => queue.to_string()).increment(1);
}

pub fn message_acked(queue: &str) {
    counter!("queue_messages_acked_total", "queue" => queue.to_string()).increment(1);
}

pub fn message_requeued(queue: &str) {
    counter!("queue_messages_requeued_total", "queue" => queue.to_string()).increment(1);
}

/// A poison message was dropped without requeue.
pub fn message_dropped(queue: &str) {
    counter!("queue_messages_dropped_total", "queue" => queue.to_string()).increment(1);
}
