use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broker::{Delivery, MessageBroker};
use super::{DistributionError, QueueNames, RoundOptions, RoundState};
use crate::codec;
use crate::evolution::individual::{sort_by_id, Individual, Population};
use crate::report::{unix_time_ns, LatencyKind, LatencyRecord, Record, ReportSink};

/// Master side of the evaluation protocol.
///
/// Owns the individuals of a round from the moment they are published until the
/// reassembled population is handed back.
pub struct Coordinator {
    broker: Arc<dyn MessageBroker>,
    queues: QueueNames,
    options: RoundOptions,
    cancellation: Option<watch::Receiver<bool>>,
    responses: Option<BoxStream<'static, Delivery>>,
    state: RoundState,
}

async fn round_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(cancellation: &mut Option<watch::Receiver<bool>>) {
    if let Some(receiver) = cancellation {
        if receiver.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    // no sender left means nobody can cancel any more
    std::future::pending().await
}

/// Pulls responses until every expected id has arrived once.
///
/// Every delivery is acknowledged. Responses whose id was already received or was not
/// part of the round are logged and dropped. The stream is handed back together with
/// the buffer so the next round can keep consuming from it.
pub(crate) async fn collect_responses(
    mut responses: BoxStream<'static, Delivery>,
    broker: Arc<dyn MessageBroker>,
    queue: String,
    mut expected: HashSet<i64>,
    received: Arc<AtomicUsize>,
) -> Result<(BoxStream<'static, Delivery>, Population), DistributionError> {
    let mut buffer = Vec::with_capacity(expected.len());

    while !expected.is_empty() {
        let delivery = responses
            .next()
            .await
            .ok_or_else(|| DistributionError::StreamClosed(queue.clone()))?;
        let decoded = codec::decode(&delivery.body);
        broker.ack(delivery).await?;
        let individual = decoded?;

        if expected.remove(&individual.id) {
            debug!(id = individual.id, queue = %queue, "Consumed individual");
            buffer.push(individual);
            received.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(
                id = individual.id,
                generation = individual.generation,
                queue = %queue,
                "Discarding duplicate or unexpected response"
            );
        }
    }

    Ok((responses, buffer))
}

impl Coordinator {
    pub fn new(broker: Arc<dyn MessageBroker>, queues: QueueNames, options: RoundOptions) -> Self {
        Coordinator {
            broker,
            queues,
            options,
            cancellation: None,
            responses: None,
            state: RoundState::Idle,
        }
    }

    /// Rounds fail with `Cancelled` once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancellation: watch::Receiver<bool>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn queues(&self) -> &QueueNames {
        &self.queues
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map_or(false, |receiver| *receiver.borrow())
    }

    /// Attaches to the response queue unless already attached.
    pub async fn subscribe(&mut self) -> Result<(), DistributionError> {
        if self.responses.is_none() {
            self.responses = Some(self.broker.consume(&self.queues.response).await?);
            info!(queue = %self.queues.response, "Subscribed to response queue");
        }
        Ok(())
    }

    /// Evaluates `population` remotely and returns it sorted by id with every
    /// fitness value set. Whatever the outcome, the coordinator is idle afterwards.
    pub async fn evaluate(&mut self, population: Population) -> Result<Population, DistributionError> {
        let result = self.run_round(population).await;
        self.state = RoundState::Idle;
        result
    }

    async fn run_round(&mut self, population: Population) -> Result<Population, DistributionError> {
        if self.is_cancelled() {
            return Err(DistributionError::Cancelled);
        }
        self.subscribe().await?;

        let mut expected_ids = HashSet::with_capacity(population.len());
        for individual in population.iter() {
            if !expected_ids.insert(individual.id) {
                return Err(DistributionError::DuplicateId(individual.id));
            }
        }
        let expected = expected_ids.len();

        self.state = RoundState::Publishing;
        for individual in population.iter() {
            let payload = codec::encode(individual)?;
            self.broker.publish(&self.queues.request, payload).await?;
            debug!(id = individual.id, queue = %self.queues.request, "Published individual");
        }
        debug!(count = expected, queue = %self.queues.request, "Published individuals");
        drop(population);

        self.state = RoundState::AwaitingResponses;
        let responses = match self.responses.take() {
            Some(responses) => responses,
            None => self.broker.consume(&self.queues.response).await?,
        };
        let received = Arc::new(AtomicUsize::new(0));
        let mut collector = tokio::spawn(collect_responses(
            responses,
            self.broker.clone(),
            self.queues.response.clone(),
            expected_ids,
            received.clone(),
        ));

        let outcome = tokio::select! {
            joined = &mut collector => {
                joined.map_err(|e| DistributionError::Task(e.to_string()))?
            }
            _ = round_deadline(self.options.timeout) => {
                collector.abort();
                return Err(DistributionError::IncompleteRound {
                    expected,
                    received: received.load(Ordering::Relaxed),
                });
            }
            _ = cancelled(&mut self.cancellation) => {
                collector.abort();
                return Err(DistributionError::Cancelled);
            }
        };
        let (responses, mut evaluated) = outcome?;
        self.responses = Some(responses);

        self.state = RoundState::Reassembling;
        sort_by_id(&mut evaluated);
        debug!(count = evaluated.len(), queue = %self.queues.response, "Consumed individuals");
        Ok(evaluated)
    }

    /// Latency experiment: publishes every individual, records a `Start` latency per
    /// individual, then waits until the request queue has drained. No responses are
    /// expected; workers in probe mode record the matching `Finish` entries.
    pub async fn probe_latency(
        &mut self,
        population: &[Individual],
        node_id: Uuid,
        run_id: Uuid,
        sink: &dyn ReportSink,
    ) -> Result<(), DistributionError> {
        let result = self.run_latency_round(population, node_id, run_id, sink).await;
        self.state = RoundState::Idle;
        result
    }

    async fn run_latency_round(
        &mut self,
        population: &[Individual],
        node_id: Uuid,
        run_id: Uuid,
        sink: &dyn ReportSink,
    ) -> Result<(), DistributionError> {
        if self.is_cancelled() {
            return Err(DistributionError::Cancelled);
        }

        self.state = RoundState::Publishing;
        let mut start_times = Vec::with_capacity(population.len());
        for individual in population {
            let payload = codec::encode(individual)?;
            start_times.push(unix_time_ns());
            self.broker.publish(&self.queues.request, payload).await?;
        }
        for (individual, time_ns) in population.iter().zip(start_times) {
            sink.record(&Record::Latency(LatencyRecord {
                node_id,
                run_id,
                generation: individual.generation,
                individual_id: individual.id,
                kind: LatencyKind::Start,
                time_ns,
            }))?;
        }

        self.state = RoundState::AwaitingResponses;
        let broker = self.broker.clone();
        let queue = self.queues.request.clone();
        let poll_interval = self.options.poll_interval;
        let drained = async move {
            loop {
                if broker.pending(&queue).await? == 0 {
                    return Ok::<(), DistributionError>(());
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::select! {
            result = drained => result,
            _ = round_deadline(self.options.timeout) => {
                let pending = self
                    .broker
                    .pending(&self.queues.request)
                    .await
                    .unwrap_or(population.len());
                Err(DistributionError::IncompleteRound {
                    expected: population.len(),
                    received: population.len().saturating_sub(pending),
                })
            }
            _ = cancelled(&mut self.cancellation) => Err(DistributionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::memory::InMemoryBroker;
    use crate::evolution::{Chromosome, FitnessValue};
    use crate::report::MemorySink;

    fn population(size: i64) -> Population {
        (0..size)
            .map(|id| Individual::new(id, 1, Chromosome::Int64(vec![id; 3])))
            .collect()
    }

    fn setup(options: RoundOptions) -> (Arc<InMemoryBroker>, Coordinator) {
        let queues = QueueNames::default();
        let broker = Arc::new(InMemoryBroker::for_queues(&queues));
        let coordinator = Coordinator::new(broker.clone(), queues, options);
        (broker, coordinator)
    }

    /// Takes `count` requests, then answers them in the order `reorder` leaves them,
    /// publishing each answer `copies` times.
    async fn answer(
        broker: Arc<InMemoryBroker>,
        count: usize,
        reorder: fn(&mut Vec<Individual>),
        copies: usize,
    ) {
        let queues = QueueNames::default();
        let mut requests = broker.consume(&queues.request).await.unwrap();
        let mut received = Vec::new();
        for _ in 0..count {
            let delivery = requests.next().await.unwrap();
            received.push(codec::decode(&delivery.body).unwrap());
            broker.ack(delivery).await.unwrap();
        }
        reorder(&mut received);
        for mut individual in received {
            individual.fitness_value = Some(FitnessValue::Int64(individual.id * 10));
            for _ in 0..copies {
                broker
                    .publish(&queues.response, codec::encode(&individual).unwrap())
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_reassembly_restores_id_order() {
        let (broker, mut coordinator) = setup(RoundOptions::default());
        let original = population(8);
        tokio::spawn(answer(broker.clone(), 8, |received| received.reverse(), 1));

        let evaluated = coordinator.evaluate(original.clone()).await.unwrap();
        assert_eq!(coordinator.state(), RoundState::Idle);
        assert_eq!(evaluated.len(), original.len());
        for (evaluated, original) in evaluated.iter().zip(original.iter()) {
            assert_eq!(evaluated.id, original.id, "population must come back in id order");
            assert_eq!(evaluated.chromosome, original.chromosome);
            assert_eq!(evaluated.fitness_value, Some(FitnessValue::Int64(original.id * 10)));
        }
        assert_eq!(broker.pending(&QueueNames::default().request).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_responses_are_discarded() {
        let (broker, mut coordinator) = setup(RoundOptions::default());
        // every answer arrives twice; the round needs only the first copy of each
        tokio::spawn(answer(broker.clone(), 4, |received| received.rotate_left(1), 2));

        let evaluated = coordinator.evaluate(population(4)).await.unwrap();
        let ids: Vec<i64> = evaluated.iter().map(|individual| individual.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unexpected_ids_are_discarded() {
        let (broker, mut coordinator) = setup(RoundOptions::default());
        let queues = QueueNames::default();
        let mut stale = Individual::new(999, 0, Chromosome::Int64(vec![0; 3]));
        stale.fitness_value = Some(FitnessValue::Int64(0));
        broker
            .publish(&queues.response, codec::encode(&stale).unwrap())
            .await
            .unwrap();
        tokio::spawn(answer(broker.clone(), 3, |_| {}, 1));

        let evaluated = coordinator.evaluate(population(3)).await.unwrap();
        assert!(evaluated.iter().all(|individual| individual.id != 999));
        assert_eq!(evaluated.len(), 3);
        assert_eq!(broker.pending(&queues.response).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timeout_reports_incomplete_round() {
        let (_broker, mut coordinator) = setup(RoundOptions {
            timeout: Some(Duration::from_millis(50)),
            ..RoundOptions::default()
        });
        match coordinator.evaluate(population(3)).await {
            Err(DistributionError::IncompleteRound { expected, received }) => {
                assert_eq!(expected, 3);
                assert_eq!(received, 0);
            }
            other => panic!("expected an incomplete round, got {:?}", other),
        }
        assert_eq!(coordinator.state(), RoundState::Idle);
    }

    #[tokio::test]
    async fn test_cancellation_stops_a_round() {
        let (_broker, coordinator) = setup(RoundOptions::default());
        let (cancel, cancellation) = watch::channel(false);
        let mut coordinator = coordinator.with_cancellation(cancellation);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = cancel.send(true);
        });
        assert!(matches!(
            coordinator.evaluate(population(2)).await,
            Err(DistributionError::Cancelled)
        ));
        // still cancelled for the next round
        assert!(matches!(
            coordinator.evaluate(population(2)).await,
            Err(DistributionError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_population_ids_are_rejected() {
        let (_broker, mut coordinator) = setup(RoundOptions::default());
        let mut duplicated = population(2);
        duplicated[1].id = 0;
        assert!(matches!(
            coordinator.evaluate(duplicated).await,
            Err(DistributionError::DuplicateId(0))
        ));
    }

    #[tokio::test]
    async fn test_latency_probe_waits_for_drain() {
        let (broker, mut coordinator) = setup(RoundOptions {
            timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(5),
        });
        let consumer = broker.clone();
        tokio::spawn(async move {
            let mut requests = consumer.consume(&QueueNames::default().request).await.unwrap();
            for _ in 0..5 {
                let delivery = requests.next().await.unwrap();
                consumer.ack(delivery).await.unwrap();
            }
        });

        let sink = MemorySink::new();
        coordinator
            .probe_latency(&population(5), Uuid::new_v4(), Uuid::new_v4(), &sink)
            .await
            .unwrap();
        let latencies = sink.latencies();
        assert_eq!(latencies.len(), 5);
        assert!(latencies.iter().all(|latency| latency.kind == LatencyKind::Start));
        assert_eq!(broker.pending(&QueueNames::default().request).await.unwrap(), 0);
    }
}
