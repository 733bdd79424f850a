use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use super::broker::{Delivery, MessageBroker, TransportError};
use super::QueueNames;

struct Queue {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    // consumers take turns on the receiver, which spreads messages across them
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Delivery>>>,
    outstanding: Mutex<HashSet<u64>>,
    next_tag: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Queue {
    fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Queue {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(AsyncMutex::new(receiver)),
            outstanding: Mutex::new(HashSet::new()),
            next_tag: AtomicU64::new(1),
        }
    }

    fn publish(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let sender = lock(&self.sender);
        let sender = sender
            .as_ref()
            .ok_or_else(|| TransportError::Closed(self.name.clone()))?;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        lock(&self.outstanding).insert(tag);
        sender
            .send(Delivery {
                queue: self.name.clone(),
                tag,
                body,
            })
            .map_err(|_| TransportError::Closed(self.name.clone()))
    }
}

/// Process-local broker: every declared queue is an unbounded channel whose
/// receiving end is shared by all consumers of that queue.
pub struct InMemoryBroker {
    queues: HashMap<String, Arc<Queue>>,
}

impl InMemoryBroker {
    pub fn new<'a>(queue_names: impl IntoIterator<Item = &'a str>) -> Self {
        InMemoryBroker {
            queues: queue_names
                .into_iter()
                .map(|name| (name.to_string(), Arc::new(Queue::new(name))))
                .collect(),
        }
    }

    /// A broker with the request and response queues declared.
    pub fn for_queues(queues: &QueueNames) -> Self {
        Self::new([queues.request.as_str(), queues.response.as_str()])
    }

    fn queue(&self, name: &str) -> Result<&Arc<Queue>, TransportError> {
        self.queues
            .get(name)
            .ok_or_else(|| TransportError::UnknownQueue(name.to_string()))
    }

    /// Stops accepting messages. Consumers drain what is buffered, then their streams end.
    pub fn close(&self) {
        for queue in self.queues.values() {
            lock(&queue.sender).take();
            debug!(queue = %queue.name, "Closed queue");
        }
    }
}

impl MessageBroker for InMemoryBroker {
    fn publish<'a>(&'a self, queue: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<(), TransportError>> {
        async move { self.queue(queue)?.publish(body) }.boxed()
    }

    fn consume<'a>(
        &'a self,
        queue: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, Delivery>, TransportError>> {
        async move {
            let receiver = self.queue(queue)?.receiver.clone();
            debug!(queue = %queue, "Attached consumer");
            Ok(stream::unfold(receiver, |receiver| async move {
                let next = receiver.lock().await.recv().await;
                next.map(|delivery| (delivery, receiver))
            })
            .boxed())
        }
        .boxed()
    }

    fn ack(&self, delivery: Delivery) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            let queue = self.queue(&delivery.queue)?;
            if lock(&queue.outstanding).remove(&delivery.tag) {
                Ok(())
            } else {
                Err(TransportError::Acknowledge {
                    queue: delivery.queue,
                    tag: delivery.tag,
                })
            }
        }
        .boxed()
    }

    fn pending<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<usize, TransportError>> {
        async move { Ok(lock(&self.queue(queue)?.outstanding).len()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_consume_ack() {
        let broker = InMemoryBroker::new(["requests"]);
        broker.publish("requests", vec![1, 2, 3]).await.unwrap();
        broker.publish("requests", vec![4]).await.unwrap();
        assert_eq!(broker.pending("requests").await.unwrap(), 2);

        let mut deliveries = broker.consume("requests").await.unwrap();
        let first = deliveries.next().await.unwrap();
        assert_eq!(first.body, vec![1, 2, 3]);
        broker.ack(first.clone()).await.unwrap();
        assert_eq!(broker.pending("requests").await.unwrap(), 1);
        assert_eq!(
            broker.ack(first).await,
            Err(TransportError::Acknowledge {
                queue: "requests".into(),
                tag: 1
            }),
            "a delivery is acknowledged only once"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_closed_queues() {
        let broker = InMemoryBroker::new(["a"]);
        assert_eq!(
            broker.publish("b", vec![]).await,
            Err(TransportError::UnknownQueue("b".into()))
        );
        assert!(broker.consume("b").await.is_err());

        broker.publish("a", vec![9]).await.unwrap();
        broker.close();
        assert_eq!(
            broker.publish("a", vec![]).await,
            Err(TransportError::Closed("a".into()))
        );
        // buffered messages are still delivered before the stream ends
        let mut deliveries = broker.consume("a").await.unwrap();
        assert_eq!(deliveries.next().await.unwrap().body, vec![9]);
        assert!(deliveries.next().await.is_none());
    }

    #[tokio::test]
    async fn test_competing_consumers_split_messages() {
        let broker = Arc::new(InMemoryBroker::new(["work"]));
        for value in 0..20u8 {
            broker.publish("work", vec![value]).await.unwrap();
        }
        broker.close();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move {
                let deliveries: Vec<Delivery> = broker.consume("work").await.unwrap().collect().await;
                deliveries
            }));
        }
        let mut seen = Vec::new();
        for handle in handles {
            seen.extend(handle.await.unwrap().into_iter().map(|delivery| delivery.body[0]));
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20u8).collect::<Vec<_>>(), "each message goes to exactly one consumer");
    }
}
