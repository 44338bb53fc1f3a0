//! `KafkaConsumer`: the orchestrator that drives `ConsumerCoordinator`,
//! `OffsetManager` and `FetchOperation` through one `each_message` round.
//! This is the only piece that owns a `Cluster` — everything it
//! calls takes the broker or partition list it needs as a plain argument,
//! resolved here.

use std::time::Instant;

use futures_cpupool::CpuPool;

use client::{Broker, Client, Cluster};
use consumer::config::ConsumerConfig;
use consumer::coordinator::ConsumerCoordinator;
use consumer::fetcher::{FetchOperation, FetchTarget, FetchedMessage};
use consumer::offset_manager::OffsetManager;
use consumer::subscriptions::Subscriptions;
use errors::{ErrorKind, Result};
use protocol::FetchOffset;

/// A sink for lifecycle notifications (join, rebalance, commit). Default
/// is a no-op; applications that want metrics or logging beyond this
/// crate's own `log` calls implement this instead of patching the
/// scheduler.
pub trait EventSink: Send + Sync {
    fn on_event(&self, name: &str, detail: &str) {
        let _ = (name, detail);
    }
}

pub struct NoopEventSink;
impl EventSink for NoopEventSink {}

/// Drives one member through `subscribe` → repeated `each_message` →
/// `shutdown`. Not `Sync`: the scheduling model is single-threaded
/// cooperative, one `KafkaConsumer` per thread.
pub struct KafkaConsumer<C: Client + Clone + Send + Sync + 'static> {
    cluster: Cluster,
    config: ConsumerConfig,
    subscriptions: Subscriptions,
    coordinator: ConsumerCoordinator<C>,
    offsets: OffsetManager<C>,
    fetcher: FetchOperation<C>,
    events: Box<EventSink>,
    last_heartbeat: Instant,
}

impl<C: Client + Clone + Send + Sync + 'static> KafkaConsumer<C> {
    pub fn new(cluster: Cluster, client: C, config: ConsumerConfig, pool: CpuPool) -> Self {
        let session_timeout_ms = (config.session_timeout_secs * 1000) as i32;
        let coordinator = ConsumerCoordinator::new(client.clone(), &config.group_id, session_timeout_ms);
        let offsets = OffsetManager::new(client.clone(), &config.group_id, -1, config.offset_commit_interval());
        let fetcher = FetchOperation::new(client, pool, config.min_bytes, config.max_wait_time_millis);

        KafkaConsumer {
            cluster: cluster,
            config: config,
            subscriptions: Subscriptions::new(),
            coordinator: coordinator,
            offsets: offsets,
            fetcher: fetcher,
            events: Box::new(NoopEventSink),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn with_event_sink(mut self, sink: Box<EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Records `topic` in the group's subscription set and the offset
    /// policy applied when no committed offset exists yet for one of its
    /// partitions.
    pub fn subscribe(&mut self, topic: &str, default_offset: FetchOffset) {
        self.subscriptions.subscribe(topic, default_offset);
        self.offsets.set_default_offset(topic, default_offset);
    }

    fn coordinator_broker(&self) -> Result<Broker> {
        self.cluster.get_group_coordinator(&self.config.group_id)
    }

    fn ensure_joined(&mut self) -> Result<()> {
        if self.coordinator.is_member() {
            return Ok(());
        }

        let broker = match self.coordinator_broker() {
            Ok(broker) => broker,
            Err(err) => {
                self.cluster.invalidate_group_coordinator(&self.config.group_id);
                return Err(err);
            }
        };

        let topics = self.subscriptions.topics();
        let cluster = self.cluster.clone();
        self.coordinator.join(&topics, &broker, move |topic| cluster.partitions_for(topic))?;

        self.subscriptions.assign_from_subscribed(self.coordinator.assigned_partitions().clone());
        self.offsets.clear_offsets_excluding(self.coordinator.assigned_partitions());
        self.last_heartbeat = Instant::now();

        let generation_id = self.coordinator.generation().map(|g| g.generation_id).unwrap_or(0);
        self.events.on_event("joined", &format!("generation {}", generation_id));

        Ok(())
    }

    /// Heartbeats if the wall-clock gap since the last successful one
    /// exceeds `session_timeout - grace`.
    pub fn send_heartbeat_if_necessary(&mut self) -> Result<()> {
        if self.last_heartbeat.elapsed() < self.config.heartbeat_interval() {
            return Ok(());
        }

        let broker = self.coordinator_broker()?;
        self.coordinator.heartbeat(&broker)?;
        self.last_heartbeat = Instant::now();
        Ok(())
    }

    /// One round of the consumer loop: join if needed, fetch everything
    /// currently assigned, and hand each message to `handler` in order,
    /// heartbeating and marking progress as it goes.
    /// Rebalance-class errors clear local bookkeeping and return `Ok(())`
    /// so the caller's next call rejoins from scratch;
    /// `ConnectionError` is logged and swallowed the same way.
    pub fn each_message<F>(&mut self, mut handler: F) -> Result<()>
        where F: FnMut(&FetchedMessage) -> Result<()>
    {
        if let Err(err) = self.ensure_joined() {
            return self.recover_or_propagate(err);
        }

        if let Err(err) = self.send_heartbeat_if_necessary() {
            return self.recover_or_propagate(err);
        }

        let coordinator_broker = self.coordinator_broker()?;
        let assigned = self.coordinator.assigned_partitions().clone();

        let mut targets = Vec::new();
        for (topic, partitions) in &assigned {
            for &partition in partitions {
                let offset = self.offsets.next_offset_for(&coordinator_broker, topic, partition)?;
                targets.push(FetchTarget {
                    topic: topic.clone(),
                    partition: partition,
                    offset: offset,
                    max_bytes: self.config.max_bytes_per_partition,
                });
            }
        }

        if targets.is_empty() {
            return Ok(());
        }

        let cluster = self.cluster.clone();
        let batch = match self.fetcher.execute(targets, move |topic, partition| cluster.get_leader(topic, partition)) {
            Ok(batch) => batch,
            Err(err) => return self.recover_or_propagate(err),
        };

        for partition_error in &batch.partition_errors {
            warn!("fetch error for {}-{}: {:?}", partition_error.topic, partition_error.partition, partition_error.code);
            if partition_error.code.is_retriable_locally() {
                let _ = self.cluster.refresh_metadata(Some(&[partition_error.topic.clone()]));
            }
        }

        for message in &batch.messages {
            handler(message)?;
            if let Err(err) = self.send_heartbeat_if_necessary() {
                return self.recover_or_propagate(err);
            }
            self.offsets.mark_as_processed(&message.topic, message.partition, message.offset);
        }

        if let Some(generation) = self.coordinator.generation().cloned() {
            self.offsets.commit_offsets_if_necessary(&coordinator_broker, &generation)?;
        }

        Ok(())
    }

    fn recover_or_propagate(&mut self, err: ::errors::Error) -> Result<()> {
        let rebalance = match err.kind() {
            &ErrorKind::KafkaError(code) => code.is_rebalance(),
            _ => false,
        };

        if rebalance {
            warn!("group {} lost membership, clearing local state: {}", self.config.group_id, err);
            let empty: ::std::collections::HashMap<String, Vec<::protocol::PartitionId>> = ::std::collections::HashMap::new();
            self.offsets.clear_offsets_excluding(&empty);
            self.subscriptions.clear_assignment();
            return Ok(());
        }

        if let &ErrorKind::ConnectionError(_) = err.kind() {
            warn!("connection error, will retry next round: {}", err);
            return Ok(());
        }

        Err(err)
    }

    /// Commits outstanding offsets, then leaves the group. Idempotent —
    /// safe to call on a consumer that never joined.
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.coordinator.is_member() {
            return Ok(());
        }

        let broker = self.coordinator_broker()?;

        if let Some(generation) = self.coordinator.generation().cloned() {
            self.offsets.commit_offsets(&broker, &generation)?;
        }

        self.coordinator.leave(&broker);
        Ok(())
    }

    pub fn assigned_partitions(&self) -> &::std::collections::HashMap<String, Vec<::protocol::PartitionId>> {
        self.coordinator.assigned_partitions()
    }
}
