use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Queue `{0}` is not declared")]
    UnknownQueue(String),
    #[error("Queue `{0}` is closed")]
    Closed(String),
    #[error("Delivery {tag} on queue `{queue}` cannot be acknowledged")]
    Acknowledge { queue: String, tag: u64 },
}

/// One message taken off a queue. It stays pending on the broker until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub queue: String,
    pub tag: u64,
    pub body: Vec<u8>,
}

/// Publish/consume primitive the coordinator and the workers talk through.
///
/// Queues are durable and non-exclusive: any number of consumers may attach to the
/// same queue, and each message is handed to exactly one of them.
pub trait MessageBroker: Send + Sync {
    fn publish<'a>(&'a self, queue: &'a str, body: Vec<u8>) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Attaches a consumer. The stream ends when the queue is closed.
    fn consume<'a>(
        &'a self,
        queue: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, Delivery>, TransportError>>;

    fn ack(&self, delivery: Delivery) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Messages published on `queue` and not yet acknowledged.
    fn pending<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<usize, TransportError>>;
}
