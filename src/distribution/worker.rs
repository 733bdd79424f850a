use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info};
use uuid::Uuid;

use super::broker::{Delivery, MessageBroker};
use super::{DistributionError, QueueNames};
use crate::codec;
use crate::evolution::fitness::FitnessFunction;
use crate::report::{unix_time_ns, LatencyKind, LatencyRecord, Record, ReportSink};

/// What a worker does with each request it consumes.
#[derive(Clone)]
pub enum WorkerMode {
    /// Evaluate the individual and publish it on the response queue.
    Evaluate(FitnessFunction),
    /// Record when the request arrived and acknowledge it without replying.
    LatencyProbe {
        sink: Arc<dyn ReportSink>,
        run_id: Uuid,
        node_id: Uuid,
    },
}

/// Stateless evaluator attached to the request queue. Handles one request at a time.
pub struct Worker {
    id: Uuid,
    broker: Arc<dyn MessageBroker>,
    queues: QueueNames,
    mode: WorkerMode,
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    // a dropped sender also stops the worker
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Worker {
    pub fn new(broker: Arc<dyn MessageBroker>, queues: QueueNames, mode: WorkerMode) -> Self {
        Worker {
            id: Uuid::new_v4(),
            broker,
            queues,
            mode,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Consumes requests until shutdown is signalled or the request queue closes.
    /// Returns how many requests were handled. Any failure ends the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<usize, DistributionError> {
        let mut requests = self.broker.consume(&self.queues.request).await?;
        info!(worker = %self.id, queue = %self.queues.request, "Worker started");

        let mut handled = 0;
        loop {
            let delivery = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                next = requests.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.handle(delivery).await?;
            handled += 1;
        }

        info!(worker = %self.id, handled, "Worker stopped");
        Ok(handled)
    }

    async fn handle(&self, delivery: Delivery) -> Result<(), DistributionError> {
        let mut individual = codec::decode(&delivery.body)?;

        match &self.mode {
            WorkerMode::Evaluate(fitness) => {
                let fitness = fitness.clone();
                let evaluated = tokio::task::spawn_blocking(move || {
                    fitness.evaluate_in_place(&mut individual).map(|_| individual)
                })
                .await
                .map_err(|e| DistributionError::Task(e.to_string()))??;

                let payload = codec::encode(&evaluated)?;
                self.broker.publish(&self.queues.response, payload).await?;
                debug!(
                    worker = %self.id,
                    id = evaluated.id,
                    generation = evaluated.generation,
                    queue = %self.queues.response,
                    "Published evaluated individual"
                );
            }
            WorkerMode::LatencyProbe { sink, run_id, node_id } => {
                sink.record(&Record::Latency(LatencyRecord {
                    node_id: *node_id,
                    run_id: *run_id,
                    generation: individual.generation,
                    individual_id: individual.id,
                    kind: LatencyKind::Finish,
                    time_ns: unix_time_ns(),
                }))?;
            }
        }

        // only once the reply is out
        self.broker.ack(delivery).await?;
        Ok(())
    }
}

/// A pool of workers running as tasks of the current runtime.
pub struct LocalCluster {
    shutdown: watch::Sender<bool>,
    workers: JoinSet<Result<usize, DistributionError>>,
    ids: Vec<Uuid>,
}

impl LocalCluster {
    pub fn spawn(
        size: usize,
        broker: Arc<dyn MessageBroker>,
        queues: &QueueNames,
        mode: WorkerMode,
    ) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let mut workers = JoinSet::new();
        let mut ids = Vec::with_capacity(size);

        for _ in 0..size {
            let worker = Worker::new(broker.clone(), queues.clone(), mode.clone());
            ids.push(worker.id());
            workers.spawn(worker.run(receiver.clone()));
        }
        info!(size, queue = %queues.request, "Spawned local cluster");

        LocalCluster {
            shutdown,
            workers,
            ids,
        }
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn worker_ids(&self) -> &[Uuid] {
        &self.ids
    }

    /// Resolves when any worker stops on its own. Never resolves for an empty cluster.
    pub async fn first_exit(&mut self) -> Result<usize, DistributionError> {
        match self.workers.join_next().await {
            Some(joined) => joined.map_err(|e| DistributionError::Task(e.to_string()))?,
            None => std::future::pending().await,
        }
    }

    /// Signals every worker to stop and waits for them. Returns the total number of
    /// requests handled, or the first worker failure.
    pub async fn shutdown(mut self) -> Result<usize, DistributionError> {
        let _ = self.shutdown.send(true);
        let mut handled = 0;
        while let Some(joined) = self.workers.join_next().await {
            handled += joined.map_err(|e| DistributionError::Task(e.to_string()))??;
        }
        Ok(handled)
    }
}
