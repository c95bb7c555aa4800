//! The queue client: one connection, pooled producers, ack'd consume loops.

use crate::config::{NatsConfig, QueueConfig};
use crate::envelope::Envelope;
use crate::error::QueueError;
use crate::handler::Handler;
use crate::metrics;
use async_nats::jetstream::{self, consumer, stream, AckKind};
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `close` waits for each consume loop to confirm its exit.
const CONSUMER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// One broker connection, multiplexed into per-queue producer and consumer
/// pools. Every pooled channel is an independent failure domain.
pub struct QueueClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    queues: RwLock<HashMap<String, QueueBinding>>,
}

struct QueueBinding {
    producers: ProducerPool<jetstream::Context>,
    consumers: Vec<ConsumerHandle>,
}

struct ConsumerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Strict round robin over a fixed set of channels; the shared cursor makes
/// the hot path lock-free.
struct ProducerPool<T> {
    channels: Vec<T>,
    cursor: AtomicU64,
}

impl<T> ProducerPool<T> {
    fn new(channels: Vec<T>) -> Self {
        Self {
            channels,
            cursor: AtomicU64::new(0),
        }
    }

    fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Next channel in registration order, wrapping around. Must not be
    /// called on an empty pool.
    fn next(&self) -> &T {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) as usize % self.channels.len();
        &self.channels[idx]
    }
}

impl QueueClient {
    /// Establish the single broker connection all queues will share.
    pub async fn connect(config: &NatsConfig) -> Result<Self, QueueError> {
        let client = async_nats::ConnectOptions::new()
            .require_tls(config.require_tls)
            .connect(&config.url)
            .await?;
        let jetstream = jetstream::new(client.clone());

        info!(url = %config.url, "Connected to NATS");
        Ok(Self {
            client,
            jetstream,
            queues: RwLock::new(HashMap::new()),
        })
    }

    /// Declare a queue and start its producer and consumer pools.
    ///
    /// The backing stream is durable (file storage), non-exclusive and never
    /// auto-deleted; its durable consumer uses explicit acks with unlimited
    /// redelivery. Consume loops stop when `token` is cancelled, when the
    /// delivery stream closes, or on [`QueueClient::close`].
    ///
    /// Defining the same queue again reuses the existing producer pool and
    /// adds more consume loops.
    pub async fn define_queue(
        &self,
        token: &CancellationToken,
        config: &QueueConfig,
        handler: Arc<dyn Handler>,
    ) -> Result<(), QueueError> {
        let queue = config.name.clone();

        let stream = self
            .jetstream
            .get_or_create_stream(stream::Config {
                name: queue.clone(),
                subjects: vec![queue.clone()],
                retention: stream::RetentionPolicy::WorkQueue,
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(QueueError::from_jetstream_error)?;

        let durable = format!("{queue}-workers");
        let consumer = stream
            .get_or_create_consumer(
                &durable,
                consumer::pull::Config {
                    durable_name: Some(durable.clone()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    // Redeliver until acked or terminated; the poison-message
                    // policy in the consume loop is the only drop path.
                    max_deliver: -1,
                    filter_subject: queue.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(QueueError::from_jetstream_error)?;

        let mut queues = self.queues.write().expect("queue registry poisoned");
        let binding = queues.entry(queue.clone()).or_insert_with(|| QueueBinding {
            producers: ProducerPool::new(Vec::new()),
            consumers: Vec::new(),
        });

        if binding.producers.is_empty() {
            binding.producers = ProducerPool::new(
                (0..config.producer_count)
                    .map(|_| jetstream::new(self.client.clone()))
                    .collect(),
            );
        }

        for worker in 0..config.consumer_count {
            let stop = token.child_token();
            let task = spawn_consume_loop(
                queue.clone(),
                worker,
                consumer.clone(),
                handler.clone(),
                stop.clone(),
            );
            binding.consumers.push(ConsumerHandle { stop, task });
        }

        info!(
            queue = %queue,
            producers = config.producer_count,
            consumers = config.consumer_count,
            handler = handler.name(),
            "Queue defined"
        );
        Ok(())
    }

    /// Publish an envelope to a previously defined queue.
    ///
    /// The publish channel is picked by atomic round robin over the queue's
    /// producer pool; the id and timestamp travel as transport headers next
    /// to the serialized envelope body.
    pub async fn send(&self, queue: &str, envelope: &Envelope) -> Result<(), QueueError> {
        let context = {
            let queues = self.queues.read().expect("queue registry poisoned");
            let binding = queues
                .get(queue)
                .ok_or_else(|| QueueError::QueueNotDefined(queue.to_string()))?;
            if binding.producers.is_empty() {
                return Err(QueueError::QueueNotDefined(queue.to_string()));
            }
            binding.producers.next().clone()
        };

        let payload = envelope.encode()?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("X-Message-Id", envelope.message_id.as_str());
        headers.insert("X-Created-At", envelope.created_at.to_rfc3339().as_str());

        context
            .publish_with_headers(queue.to_string(), headers, payload.into())
            .await
            .map_err(QueueError::publish_error)?
            .await
            .map_err(QueueError::publish_error)?;

        metrics::message_published(queue);
        debug!(queue, message_id = %envelope.message_id, "Message published");
        Ok(())
    }

    /// Tear down every queue and close the connection.
    ///
    /// Best-effort: consumer loops are signalled and awaited up to 5 s each,
    /// then the connection is flushed and drained. The first error is
    /// retained but never short-circuits the remaining cleanup.
    pub async fn close(&self) -> Result<(), QueueError> {
        let bindings: Vec<(String, QueueBinding)> = {
            let mut queues = self.queues.write().expect("queue registry poisoned");
            queues.drain().collect()
        };

        let mut first_error: Option<QueueError> = None;

        for (queue, binding) in bindings {
            drop(binding.producers);

            for handle in binding.consumers {
                handle.stop.cancel();
                if tokio::time::timeout(CONSUMER_STOP_TIMEOUT, handle.task)
                    .await
                    .is_err()
                {
                    warn!(queue = %queue, "Consume loop did not confirm exit in time");
                    first_error.get_or_insert(QueueError::ConsumerStalled {
                        queue: queue.clone(),
                    });
                }
            }
        }

        if let Err(err) = self.client.flush().await {
            first_error.get_or_insert(QueueError::close_error(err));
        }
        if let Err(err) = self.client.drain().await {
            first_error.get_or_insert(QueueError::close_error(err));
        }

        info!("Queue client closed");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// What to do with a delivery after the decode/handle pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Handler succeeded; acknowledge.
    Ack,
    /// Handler failed; reject and let the broker redeliver.
    Requeue,
    /// Poison message; reject without redelivery.
    Drop,
}

/// Decode and handle one delivery. Undecodable payloads are dropped without
/// ever reaching the handler.
async fn process_delivery(queue: &str, payload: &[u8], handler: &dyn Handler) -> Disposition {
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(queue, error = %err, "Dropping undecodable message");
            return Disposition::Drop;
        }
    };

    match handler.handle(&envelope).await {
        Ok(()) => Disposition::Ack,
        Err(err) => {
            warn!(
                queue,
                message_id = %envelope.message_id,
                handler = handler.name(),
                error = %err,
                "Handler failed, requeueing delivery"
            );
            Disposition::Requeue
        }
    }
}

async fn settle(queue: &str, worker: usize, message: jetstream::Message, disposition: Disposition) {
    let result = match disposition {
        Disposition::Ack => {
            metrics::message_acked(queue);
            message.ack().await
        }
        Disposition::Requeue => {
            metrics::message_requeued(queue);
            message.ack_with(AckKind::Nak(None)).await
        }
        Disposition::Drop => {
            metrics::message_dropped(queue);
            message.ack_with(AckKind::Term).await
        }
    };

    if let Err(err) = result {
        warn!(queue, worker, error = %err, "Failed to settle delivery");
    }
}

async fn consume_loop(
    queue: &str,
    worker: usize,
    consumer: consumer::Consumer<consumer::pull::Config>,
    handler: Arc<dyn Handler>,
    stop: CancellationToken,
) -> Result<(), QueueError> {
    let mut messages = consumer
        .messages()
        .await
        .map_err(QueueError::consumer_error)?;

    debug!(queue, worker, handler = handler.name(), "Consume loop started");
    loop {
        tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            next = messages.next() => match next {
                None => {
                    info!(queue, worker, "Delivery stream closed");
                    return Ok(());
                }
                Some(Err(err)) => {
                    warn!(queue, worker, error = %err, "Error receiving delivery");
                }
                Some(Ok(message)) => {
                    let disposition =
                        process_delivery(queue, &message.payload, handler.as_ref()).await;
                    settle(queue, worker, message, disposition).await;
                }
            },
        }
    }
}

/// Run one consume loop on its own task. A panic or error ends this loop
/// only; siblings on the same queue and the rest of the process are
/// unaffected.
fn spawn_consume_loop(
    queue: String,
    worker: usize,
    consumer: consumer::Consumer<consumer::pull::Config>,
    handler: Arc<dyn Handler>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let run = consume_loop(&queue, worker, consumer, handler, stop);
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(())) => debug!(queue = %queue, worker, "Consume loop stopped"),
            Ok(Err(err)) => error!(queue = %queue, worker, error = %err, "Consume loop failed"),
            Err(_panic) => error!(queue = %queue, worker, "Panic in consume loop"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::{FailingHandler, NoOpHandler};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn round_robin_visits_channels_in_order() {
        let pool = ProducerPool::new(vec!['a', 'b', 'c']);
        let picks: Vec<char> = (0..7).map(|_| *pool.next()).collect();
        assert_eq!(picks, vec!['a', 'b', 'c', 'a', 'b', 'c', 'a']);
    }

    #[test]
    fn round_robin_single_channel() {
        let pool = ProducerPool::new(vec![0usize]);
        assert_eq!(*pool.next(), 0);
        assert_eq!(*pool.next(), 0);
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _envelope: &Envelope) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "counting_handler"
        }
    }

    #[tokio::test]
    async fn successful_handler_acknowledges() {
        let payload = Envelope::new(&"x", None).unwrap().encode().unwrap();
        let disposition = process_delivery("q", &payload, &NoOpHandler).await;
        assert_eq!(disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn failing_handler_requeues() {
        let payload = Envelope::new(&"x", None).unwrap().encode().unwrap();
        let disposition = process_delivery("q", &payload, &FailingHandler::new("nope")).await;
        assert_eq!(disposition, Disposition::Requeue);
    }

    #[tokio::test]
    async fn poison_message_is_dropped_without_reaching_the_handler() {
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
        };

        let disposition = process_delivery("q", b"{not json", &handler).await;
        assert_eq!(disposition, Disposition::Drop);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

        // A well-formed envelope still reaches it.
        let payload = Envelope::new(&"x", None).unwrap().encode().unwrap();
        let disposition = process_delivery("q", &payload, &handler).await;
        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
