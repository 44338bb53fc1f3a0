//! End-to-end scenarios against a scripted fake broker (no network I/O),
//! gated behind a feature flag like any other opt-in integration
//! suite: `cargo test --features integration_test`.
//!
//! These wire `ConsumerCoordinator`, `OffsetManager` and `FetchOperation`
//! together by hand against one shared `FakeCluster`, the way
//! `KafkaConsumer::each_message` would, since `KafkaConsumer` itself is
//! built against a live `Cluster` and therefore needs a real socket.

#![cfg(feature = "integration_test")]

extern crate kafka_group_client;
extern crate futures_cpupool;
extern crate bytes;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_cpupool::CpuPool;

use kafka_group_client::client::{Broker, Client};
use kafka_group_client::consumer::{ConsumerCoordinator, FetchOperation, FetchTarget, OffsetManager};
use kafka_group_client::protocol::{FetchPartition, FetchResponse, FetchTopic, GenerationId,
                                   HeartbeatResponse, JoinGroupMember, JoinGroupProtocol,
                                   JoinGroupResponse, LeaveGroupResponse, ListOffsetsResponse,
                                   ListOffsetsTopic, Message, MessageSet, OffsetCommitResponse,
                                   OffsetCommitTopic, OffsetFetchPartition, OffsetFetchResponse,
                                   OffsetFetchTopic, PartitionData, ResponseHeader,
                                   SyncGroupAssignment, SyncGroupResponse, TopicData};

fn broker() -> Broker {
    Broker { node_id: 1, host: "localhost".to_owned(), port: 9092 }
}

fn header() -> ResponseHeader {
    ResponseHeader { correlation_id: 0 }
}

fn message(offset: i64, value: &str) -> Message {
    Message {
        offset: offset,
        timestamp: None,
        compression: kafka_group_client::protocol::Compression::None,
        key: None,
        value: Some(Bytes::from(value.as_bytes().to_vec())),
    }
}

/// A single topic, `orders`, with two partitions each holding offsets
/// 0..9. Shared state lives behind `Arc` so that every clone
/// handed to a `ConsumerCoordinator`/`OffsetManager`/`FetchOperation`
/// observes the same log and commits, the way a real `KafkaClient`'s
/// clones all talk to the same cluster.
#[derive(Clone)]
struct FakeCluster {
    log: Arc<Mutex<HashMap<i32, Vec<Message>>>>,
    committed: Arc<Mutex<HashMap<(String, i32), i64>>>,
    rebalance_pending: Arc<Mutex<bool>>,
}

impl FakeCluster {
    fn new() -> Self {
        let mut log = HashMap::new();
        log.insert(0, (0..10).map(|o| message(o, &format!("p0-{}", o))).collect());
        log.insert(1, (0..10).map(|o| message(o, &format!("p1-{}", o))).collect());
        FakeCluster {
            log: Arc::new(Mutex::new(log)),
            committed: Arc::new(Mutex::new(HashMap::new())),
            rebalance_pending: Arc::new(Mutex::new(false)),
        }
    }
}

impl Client for FakeCluster {
    fn fetch(&self, _broker: &Broker, _max_wait_time: i32, _min_bytes: i32, topics: Vec<FetchTopic>) -> kafka_group_client::Result<FetchResponse> {
        let log = self.log.lock().unwrap();
        let topics = topics.into_iter()
            .map(|t| {
                let partitions = t.partitions
                    .into_iter()
                    .map(|p: FetchPartition| {
                        let all = log.get(&p.partition).cloned().unwrap_or_default();
                        let tail: Vec<Message> = all.into_iter().filter(|m| m.offset >= p.fetch_offset).collect();
                        let highwater = tail.last().map(|m| m.offset + 1).unwrap_or(p.fetch_offset.max(0));
                        PartitionData {
                            partition: p.partition,
                            error_code: 0,
                            highwater_mark_offset: highwater,
                            message_set: MessageSet { messages: tail },
                        }
                    })
                    .collect();
                TopicData { topic_name: t.topic_name, partitions: partitions }
            })
            .collect();
        Ok(FetchResponse { header: header(), topics: topics })
    }

    fn list_offsets(&self, _: &Broker, _: Vec<ListOffsetsTopic>) -> kafka_group_client::Result<ListOffsetsResponse> {
        unimplemented!("not exercised by this scenario")
    }

    fn join_group(&self,
                 _coordinator: &Broker,
                 _group_id: &str,
                 _session_timeout_ms: i32,
                 _member_id: &str,
                 _protocol_type: &str,
                 group_protocols: Vec<JoinGroupProtocol>)
                 -> kafka_group_client::Result<JoinGroupResponse> {
        let metadata = group_protocols.into_iter().next().expect("one protocol offered").protocol_metadata;
        Ok(JoinGroupResponse {
            header: header(),
            error_code: 0,
            generation_id: 1,
            protocol: "standard".to_owned(),
            leader_id: "m1".to_owned(),
            member_id: "m1".to_owned(),
            members: vec![JoinGroupMember { member_id: "m1".to_owned(), member_metadata: metadata }],
        })
    }

    fn sync_group(&self,
                 _coordinator: &Broker,
                 _group_id: &str,
                 _generation_id: GenerationId,
                 _member_id: &str,
                 group_assignment: Vec<SyncGroupAssignment>)
                 -> kafka_group_client::Result<SyncGroupResponse> {
        let assignment = group_assignment.into_iter()
            .find(|a| a.member_id == "m1")
            .expect("leader computed an assignment for m1");
        Ok(SyncGroupResponse { header: header(), error_code: 0, member_assignment: assignment.member_assignment })
    }

    fn heartbeat(&self, _: &Broker, _: &str, _: GenerationId, _: &str) -> kafka_group_client::Result<HeartbeatResponse> {
        let code = if *self.rebalance_pending.lock().unwrap() {
            kafka_group_client::KafkaCode::RebalanceInProgress as i16
        } else {
            0
        };
        Ok(HeartbeatResponse { header: header(), error_code: code })
    }

    fn leave_group(&self, _: &Broker, _: &str, _: &str) -> kafka_group_client::Result<LeaveGroupResponse> {
        Ok(LeaveGroupResponse { header: header(), error_code: 0 })
    }

    fn offset_commit(&self,
                     _coordinator: &Broker,
                     _group_id: &str,
                     _generation_id: GenerationId,
                     _member_id: &str,
                     _retention_time: i64,
                     topics: Vec<OffsetCommitTopic>)
                     -> kafka_group_client::Result<OffsetCommitResponse> {
        let mut committed = self.committed.lock().unwrap();
        let mut response_topics = Vec::new();
        for topic in topics {
            let mut partitions = Vec::new();
            for partition in topic.partitions {
                committed.insert((topic.topic_name.clone(), partition.partition), partition.offset);
                partitions.push((partition.partition, 0));
            }
            response_topics.push((topic.topic_name, partitions));
        }
        Ok(OffsetCommitResponse { header: header(), topics: response_topics })
    }

    fn offset_fetch(&self, _coordinator: &Broker, _group_id: &str, topics: Vec<OffsetFetchTopic>) -> kafka_group_client::Result<OffsetFetchResponse> {
        let committed = self.committed.lock().unwrap();
        let response_topics = topics.into_iter()
            .map(|t| {
                let partitions = t.partitions
                    .into_iter()
                    .map(|p| {
                        let offset = committed.get(&(t.topic_name.clone(), p)).cloned().unwrap_or(-1);
                        OffsetFetchPartition { partition: p, offset: offset, metadata: None, error_code: 0 }
                    })
                    .collect();
                (t.topic_name.clone(), partitions)
            })
            .collect();
        Ok(OffsetFetchResponse { header: header(), topics: response_topics })
    }
}

/// A single member subscribed to one two-partition topic consumes every
/// message in offset order per partition and, after committing, the
/// coordinator's offset store holds offset 9 for both partitions — plus
/// the commit-then-crash property: a fresh coordinator/offset-manager
/// pair resumes at the first unprocessed offset rather than replaying
/// from the start.
#[test]
fn test_single_member_consumes_topic_to_completion_then_resumes_after_restart() {
    let client = FakeCluster::new();

    let mut coordinator = ConsumerCoordinator::new(client.clone(), "g", 30_000);
    coordinator.join(&["orders"], &broker(), |_topic| Ok(vec![0, 1])).unwrap();
    assert!(coordinator.is_member());

    let assigned = coordinator.assigned_partitions().clone();
    assert_eq!(assigned.get("orders").map(|p| { let mut p = p.clone(); p.sort(); p }), Some(vec![0, 1]));

    let mut offsets = OffsetManager::new(client.clone(), "g", -1, Duration::from_secs(10));

    let mut targets = Vec::new();
    for &partition in assigned.get("orders").unwrap() {
        let offset = offsets.next_offset_for(&broker(), "orders", partition).unwrap();
        // no committed offset exists yet; the default policy is earliest (-2),
        // which this fake resolves to the log's first offset, 0.
        assert_eq!(offset, -2);
        targets.push(FetchTarget { topic: "orders".to_owned(), partition: partition, offset: 0, max_bytes: 1 << 20 });
    }

    let fetcher = FetchOperation::new(client.clone(), CpuPool::new(2), 1, 500);
    let batch = fetcher.execute(targets, |_, _| Ok(broker())).unwrap();

    assert_eq!(batch.messages.len(), 20);
    assert!(batch.partition_errors.is_empty());

    let mut last_offset: HashMap<i32, i64> = HashMap::new();
    for m in &batch.messages {
        if let Some(&prev) = last_offset.get(&m.partition) {
            assert!(m.offset > prev, "offsets must increase within a partition");
        }
        last_offset.insert(m.partition, m.offset);
        offsets.mark_as_processed(&m.topic, m.partition, m.offset);
    }
    assert_eq!(last_offset.get(&0), Some(&9));
    assert_eq!(last_offset.get(&1), Some(&9));

    let generation = coordinator.generation().cloned().unwrap();
    offsets.commit_offsets(&broker(), &generation).unwrap();

    assert_eq!(*client.committed.lock().unwrap().get(&("orders".to_owned(), 0)).unwrap(), 10);
    assert_eq!(*client.committed.lock().unwrap().get(&("orders".to_owned(), 1)).unwrap(), 10);

    // Simulate a restart: a fresh offset manager has no local state and
    // must ask the coordinator, which now reports the committed offset.
    let mut restarted = OffsetManager::new(client.clone(), "g", -1, Duration::from_secs(10));
    assert_eq!(restarted.next_offset_for(&broker(), "orders", 0).unwrap(), 10);
    assert_eq!(restarted.next_offset_for(&broker(), "orders", 1).unwrap(), 10);
}

/// The rebalance half: a heartbeat reporting
/// `RebalanceInProgress` drops membership, and the very next `join()`
/// re-runs the full JoinGroup/SyncGroup exchange rather than reusing
/// stale state.
#[test]
fn test_rebalance_on_heartbeat_forces_clean_rejoin() {
    let client = FakeCluster::new();
    let mut coordinator = ConsumerCoordinator::new(client.clone(), "g", 30_000);
    coordinator.join(&["orders"], &broker(), |_| Ok(vec![0, 1])).unwrap();
    assert!(coordinator.is_member());

    *client.rebalance_pending.lock().unwrap() = true;
    coordinator.heartbeat(&broker()).unwrap_err();
    assert!(!coordinator.is_member());
    assert!(coordinator.generation().is_none());

    *client.rebalance_pending.lock().unwrap() = false;
    coordinator.join(&["orders"], &broker(), |_| Ok(vec![0, 1])).unwrap();
    assert!(coordinator.is_member());
    assert_eq!(coordinator.generation().unwrap().member_id, "m1");
}
