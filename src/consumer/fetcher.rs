//! Runs one round of `Fetch` requests across however many brokers the
//! requested partitions are spread over. The only intra-consumer
//! parallelism in this crate lives here: one `CpuPool` worker per broker,
//! joined before `execute` returns.
//!
//! As with `ConsumerCoordinator`/`OffsetManager`, broker resolution is the
//! caller's job — `execute` takes a `leader_for` closure rather than a
//! `Cluster`, so it can be driven against a fake `Client` and a fixed
//! topology in tests.

use std::collections::HashMap;

use bytes::Bytes;
use futures::Future;
use futures_cpupool::CpuPool;

use client::{Broker, Client};
use errors::{KafkaCode, Result};
use protocol::{FetchPartition, FetchTopic, NodeId, Offset, PartitionId};

/// One `(topic, partition)` to fetch, at the offset the offset manager
/// says to resume from.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchTarget {
    pub topic: String,
    pub partition: PartitionId,
    pub offset: Offset,
    pub max_bytes: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchedMessage {
    pub topic: String,
    pub partition: PartitionId,
    pub offset: Offset,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// A partition whose fetch came back with a non-zero error code. Carried
/// alongside the batch rather than raised as an `Err`: one bad partition
/// must not discard messages the rest of the batch delivered cleanly.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionError {
    pub topic: String,
    pub partition: PartitionId,
    pub code: KafkaCode,
}

/// The result of one `execute` round: messages in stable order (by broker
/// dispatched, then by partition requested, then by offset), partitions
/// that errored, and each partition's current high-watermark.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchBatch {
    pub messages: Vec<FetchedMessage>,
    pub partition_errors: Vec<PartitionError>,
    pub highwater_marks: HashMap<(String, PartitionId), Offset>,
}

pub struct FetchOperation<C: Client> {
    client: C,
    pool: CpuPool,
    min_bytes: i32,
    max_wait_time_ms: i32,
}

impl<C: Client + Clone + Send + Sync + 'static> FetchOperation<C> {
    pub fn new(client: C, pool: CpuPool, min_bytes: i32, max_wait_time_ms: i32) -> Self {
        FetchOperation {
            client: client,
            pool: pool,
            min_bytes: min_bytes,
            max_wait_time_ms: max_wait_time_ms,
        }
    }

    /// Buckets `targets` by leader, dispatches one `FetchRequest` per
    /// bucket on the pool, and joins the results. `leader_for` resolves a
    /// target's current leader (normally `Cluster::get_leader`).
    pub fn execute<F>(&self, targets: Vec<FetchTarget>, leader_for: F) -> Result<FetchBatch>
        where F: Fn(&str, PartitionId) -> Result<Broker>
    {
        let mut order: Vec<NodeId> = Vec::new();
        let mut buckets: HashMap<NodeId, (Broker, Vec<FetchTarget>)> = HashMap::new();

        for target in targets {
            let broker = leader_for(&target.topic, target.partition)?;
            let node_id = broker.node_id;
            buckets.entry(node_id)
                .or_insert_with(|| {
                    order.push(node_id);
                    (broker, Vec::new())
                })
                .1
                .push(target);
        }

        let client = self.client.clone();
        let min_bytes = self.min_bytes;
        let max_wait_time_ms = self.max_wait_time_ms;

        let futures: Vec<_> = order.iter()
            .map(|node_id| {
                let (broker, bucket_targets) = buckets.remove(node_id).expect("order only lists known buckets");
                let client = client.clone();
                self.pool.spawn_fn(move || -> Result<BucketResult> {
                    fetch_bucket(&client, &broker, min_bytes, max_wait_time_ms, bucket_targets)
                })
            })
            .collect();

        let mut batch = FetchBatch::default();
        for future in futures {
            let bucket = future.wait()?;
            batch.messages.extend(bucket.messages);
            batch.partition_errors.extend(bucket.partition_errors);
            batch.highwater_marks.extend(bucket.highwater_marks);
        }

        Ok(batch)
    }
}

struct BucketResult {
    messages: Vec<FetchedMessage>,
    partition_errors: Vec<PartitionError>,
    highwater_marks: HashMap<(String, PartitionId), Offset>,
}

fn fetch_bucket(client: &Client, broker: &Broker, min_bytes: i32, max_wait_time_ms: i32, targets: Vec<FetchTarget>) -> Result<BucketResult> {
    let mut topic_order: Vec<String> = Vec::new();
    let mut by_topic: HashMap<String, Vec<FetchTarget>> = HashMap::new();
    for target in targets {
        by_topic.entry(target.topic.clone())
            .or_insert_with(|| {
                topic_order.push(target.topic.clone());
                Vec::new()
            })
            .push(target);
    }

    let wire_topics: Vec<FetchTopic> = topic_order.iter()
        .map(|topic| {
            let targets = &by_topic[topic];
            FetchTopic {
                topic_name: topic.clone(),
                partitions: targets.iter()
                    .map(|t| FetchPartition { partition: t.partition, fetch_offset: t.offset, max_bytes: t.max_bytes })
                    .collect(),
            }
        })
        .collect();

    let response = client.fetch(broker, max_wait_time_ms, min_bytes, wire_topics)?;

    let mut by_response: HashMap<(String, PartitionId), _> = HashMap::new();
    for topic_data in response.topics {
        for partition_data in topic_data.partitions {
            by_response.insert((topic_data.topic_name.clone(), partition_data.partition), partition_data);
        }
    }

    let mut messages = Vec::new();
    let mut partition_errors = Vec::new();
    let mut highwater_marks = HashMap::new();

    for topic in &topic_order {
        for target in &by_topic[topic] {
            let key = (target.topic.clone(), target.partition);
            let partition_data = match by_response.remove(&key) {
                Some(data) => data,
                None => continue,
            };

            highwater_marks.insert(key.clone(), partition_data.highwater_mark_offset);

            let code = KafkaCode::from(partition_data.error_code);
            if code != KafkaCode::None {
                partition_errors.push(PartitionError { topic: target.topic.clone(), partition: target.partition, code: code });
                continue;
            }

            for message in partition_data.message_set.messages {
                messages.push(FetchedMessage {
                    topic: target.topic.clone(),
                    partition: target.partition,
                    offset: message.offset,
                    key: message.key,
                    value: message.value,
                });
            }
        }
    }

    Ok(BucketResult { messages: messages, partition_errors: partition_errors, highwater_marks: highwater_marks })
}

#[cfg(test)]
mod tests {
    use protocol::{FetchResponse, GenerationId, HeartbeatResponse, JoinGroupProtocol,
                   JoinGroupResponse, LeaveGroupResponse, ListOffsetsResponse, ListOffsetsTopic,
                   Message, MessageSet, OffsetCommitResponse, OffsetCommitTopic,
                   OffsetFetchResponse, OffsetFetchTopic, PartitionData, ResponseHeader,
                   SyncGroupAssignment, SyncGroupResponse, TopicData};

    use std::sync::{Arc, Mutex};

    use super::*;

    fn header() -> ResponseHeader {
        ResponseHeader { correlation_id: 0 }
    }

    fn broker(node_id: NodeId) -> Broker {
        Broker { node_id: node_id, host: "localhost".to_owned(), port: 9092 }
    }

    fn message(offset: Offset, value: &str) -> Message {
        Message {
            offset: offset,
            timestamp: None,
            compression: ::protocol::Compression::None,
            key: None,
            value: Some(Bytes::from(value.as_bytes())),
        }
    }

    /// One broker serving exactly the partitions it's told to, at a fixed
    /// high-watermark. `calls` records the node id of every broker passed
    /// to `fetch`, one entry per dispatched request, so a test can assert
    /// on dispatch fan-out instead of just the merged result.
    struct FakeClient {
        partitions: HashMap<PartitionId, (Vec<Message>, i16)>,
        calls: Arc<Mutex<Vec<NodeId>>>,
    }

    impl Client for FakeClient {
        fn fetch(&self, broker: &Broker, _max_wait_time: i32, _min_bytes: i32, topics: Vec<FetchTopic>) -> Result<FetchResponse> {
            self.calls.lock().unwrap().push(broker.node_id);
            let topics = topics.into_iter()
                .map(|t| {
                    let partitions = t.partitions
                        .into_iter()
                        .map(|p| {
                            let (messages, error_code) = self.partitions.get(&p.partition).cloned().unwrap_or_default();
                            PartitionData {
                                partition: p.partition,
                                error_code: error_code,
                                highwater_mark_offset: messages.last().map(|m| m.offset + 1).unwrap_or(0),
                                message_set: MessageSet { messages: messages },
                            }
                        })
                        .collect();
                    TopicData { topic_name: t.topic_name, partitions: partitions }
                })
                .collect();
            Ok(FetchResponse { header: header(), topics: topics })
        }
        fn list_offsets(&self, _: &Broker, _: Vec<ListOffsetsTopic>) -> Result<ListOffsetsResponse> {
            unimplemented!()
        }
        fn join_group(&self, _: &Broker, _: &str, _: i32, _: &str, _: &str, _: Vec<JoinGroupProtocol>) -> Result<JoinGroupResponse> {
            unimplemented!()
        }
        fn sync_group(&self, _: &Broker, _: &str, _: GenerationId, _: &str, _: Vec<SyncGroupAssignment>) -> Result<SyncGroupResponse> {
            unimplemented!()
        }
        fn heartbeat(&self, _: &Broker, _: &str, _: GenerationId, _: &str) -> Result<HeartbeatResponse> {
            unimplemented!()
        }
        fn leave_group(&self, _: &Broker, _: &str, _: &str) -> Result<LeaveGroupResponse> {
            unimplemented!()
        }
        fn offset_commit(&self, _: &Broker, _: &str, _: GenerationId, _: &str, _: i64, _: Vec<OffsetCommitTopic>) -> Result<OffsetCommitResponse> {
            unimplemented!()
        }
        fn offset_fetch(&self, _: &Broker, _: &str, _: Vec<OffsetFetchTopic>) -> Result<OffsetFetchResponse> {
            unimplemented!()
        }
    }

    impl Clone for FakeClient {
        fn clone(&self) -> Self {
            FakeClient { partitions: self.partitions.clone(), calls: self.calls.clone() }
        }
    }

    fn fake_client(partitions: HashMap<PartitionId, (Vec<Message>, i16)>) -> FakeClient {
        FakeClient { partitions: partitions, calls: Arc::new(Mutex::new(Vec::new())) }
    }

    #[test]
    fn test_execute_preserves_offset_order_per_partition() {
        let mut partitions = HashMap::new();
        partitions.insert(0, (vec![message(5, "a"), message(6, "b")], 0));
        let client = fake_client(partitions);

        let op = FetchOperation::new(client, CpuPool::new(1), 1, 500);
        let targets = vec![FetchTarget { topic: "t".to_owned(), partition: 0, offset: 5, max_bytes: 1024 }];

        let batch = op.execute(targets, |_, _| Ok(broker(1))).unwrap();

        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0].offset, 5);
        assert_eq!(batch.messages[1].offset, 6);
        assert!(batch.partition_errors.is_empty());
        assert_eq!(batch.highwater_marks.get(&("t".to_owned(), 0)), Some(&7));
    }

    #[test]
    fn test_execute_surfaces_partition_errors_without_failing_the_batch() {
        let mut partitions = HashMap::new();
        partitions.insert(0, (vec![message(0, "a")], 0));
        partitions.insert(1, (Vec::new(), KafkaCode::NotLeaderForPartition as i16));
        let client = fake_client(partitions);

        let op = FetchOperation::new(client, CpuPool::new(1), 1, 500);
        let targets = vec![FetchTarget { topic: "t".to_owned(), partition: 0, offset: 0, max_bytes: 1024 },
                           FetchTarget { topic: "t".to_owned(), partition: 1, offset: 0, max_bytes: 1024 }];

        let batch = op.execute(targets, |_, _| Ok(broker(1))).unwrap();

        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.partition_errors, vec![PartitionError {
                       topic: "t".to_owned(),
                       partition: 1,
                       code: KafkaCode::NotLeaderForPartition,
                   }]);
    }

    #[test]
    fn test_execute_dispatches_a_single_request_when_partitions_share_a_broker() {
        let mut partitions = HashMap::new();
        partitions.insert(0, (vec![message(0, "a")], 0));
        partitions.insert(1, (vec![message(0, "b")], 0));
        let client = fake_client(partitions);
        let calls = client.calls.clone();

        let op = FetchOperation::new(client, CpuPool::new(2), 1, 500);
        let targets = vec![FetchTarget { topic: "t".to_owned(), partition: 0, offset: 0, max_bytes: 1024 },
                           FetchTarget { topic: "t".to_owned(), partition: 1, offset: 0, max_bytes: 1024 }];

        let batch = op.execute(targets, |_, _| Ok(broker(1))).unwrap();

        assert_eq!(batch.messages.len(), 2);
        assert_eq!(*calls.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_execute_dispatches_one_request_per_distinct_broker() {
        let mut partitions = HashMap::new();
        partitions.insert(0, (vec![message(0, "a")], 0));
        partitions.insert(1, (vec![message(0, "b")], 0));
        partitions.insert(2, (vec![message(0, "c")], 0));
        let client = fake_client(partitions);
        let calls = client.calls.clone();

        // Three partitions spread across two brokers: node 1 leads
        // partitions 0 and 1, node 2 leads partition 2. Exactly one
        // `fetch` call should land on each broker, not one per partition.
        let op = FetchOperation::new(client, CpuPool::new(4), 1, 500);
        let targets = vec![FetchTarget { topic: "t".to_owned(), partition: 0, offset: 0, max_bytes: 1024 },
                           FetchTarget { topic: "t".to_owned(), partition: 1, offset: 0, max_bytes: 1024 },
                           FetchTarget { topic: "t".to_owned(), partition: 2, offset: 0, max_bytes: 1024 }];

        let batch = op.execute(targets, |_, partition| {
            Ok(broker(if partition == 2 { 2 } else { 1 }))
        }).unwrap();

        assert_eq!(batch.messages.len(), 3);

        let mut seen = calls.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }
}
