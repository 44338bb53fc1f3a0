//! Tracks, and periodically commits, per-partition progress for one
//! consumer group member. Three numbers matter per partition: the
//! offset last committed to the group's offset store, the offset of the
//! last message this process handed to the application, and the default
//! position to start from when neither exists yet.
//!
//! Like `ConsumerCoordinator`, every method that talks to a broker takes
//! the resolved group coordinator as a plain `&Broker` argument rather
//! than holding a `Cluster` internally, so the whole thing runs against a
//! fake `Client` in tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use client::{Broker, Client};
use consumer::coordinator::Generation;
use errors::{ErrorKind, KafkaCode, Result};
use protocol::{FetchOffset, Offset, OffsetCommitPartition, OffsetCommitTopic, OffsetFetchTopic,
              PartitionId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PartitionOffsetState {
    /// Last offset this process committed (or fetched as already
    /// committed) for this partition. `None` means never queried.
    committed: Option<Offset>,
    /// Last offset handed to the application via `mark_as_processed`.
    /// `None` means nothing processed yet this generation.
    processed: Option<Offset>,
}

/// Owns one member's view of group offsets: what to fetch next, what has
/// been processed, and when it was last safe to commit.
pub struct OffsetManager<C: Client> {
    client: C,
    group_id: String,
    retention_time_ms: i64,
    commit_interval: Duration,
    default_offsets: HashMap<String, FetchOffset>,
    state: HashMap<(String, PartitionId), PartitionOffsetState>,
    last_commit: Instant,
}

impl<C: Client> OffsetManager<C> {
    pub fn new(client: C, group_id: &str, retention_time_ms: i64, commit_interval: Duration) -> Self {
        OffsetManager {
            client: client,
            group_id: group_id.to_owned(),
            retention_time_ms: retention_time_ms,
            commit_interval: commit_interval,
            default_offsets: HashMap::new(),
            state: HashMap::new(),
            last_commit: Instant::now(),
        }
    }

    /// Sets the policy applied to a partition that has no committed
    /// offset in the group's offset store. Defaults to `Earliest`.
    pub fn set_default_offset(&mut self, topic: &str, policy: FetchOffset) {
        self.default_offsets.insert(topic.to_owned(), policy);
    }

    fn default_offset(&self, topic: &str) -> FetchOffset {
        self.default_offsets.get(topic).cloned().unwrap_or(FetchOffset::Earliest)
    }

    /// Resolves the offset the next `Fetch` for `(topic, partition)`
    /// should ask for: the offset right after whatever this process has
    /// already processed, falling back to the group's committed offset
    /// (fetched once and cached), falling back to `default_offset`.
    pub fn next_offset_for(&mut self, coordinator: &Broker, topic: &str, partition: PartitionId) -> Result<Offset> {
        if let Some(state) = self.state.get(&(topic.to_owned(), partition)) {
            if let Some(processed) = state.processed {
                return Ok(processed + 1);
            }
            if let Some(committed) = state.committed {
                return Ok(committed);
            }
        }

        let response = self.client
            .offset_fetch(coordinator,
                         &self.group_id,
                         vec![OffsetFetchTopic { topic_name: topic.to_owned(), partitions: vec![partition] }])?;

        let fetched = response.topics
            .into_iter()
            .find(|&(ref name, _)| name == topic)
            .and_then(|(_, partitions)| partitions.into_iter().find(|p| p.partition == partition));

        let resolved = match fetched {
            Some(ref p) if KafkaCode::from(p.error_code) != KafkaCode::None => {
                bail!(ErrorKind::KafkaError(KafkaCode::from(p.error_code)));
            }
            Some(ref p) if p.offset >= 0 => p.offset,
            _ => self.default_offset(topic).to_wire(),
        };

        self.state.entry((topic.to_owned(), partition)).or_insert_with(Default::default).committed = Some(resolved);
        Ok(resolved)
    }

    /// Records that the application has finished handling `offset`; the
    /// next `commit_offsets` call will push `offset` (not `offset + 1` —
    /// Kafka's convention is that a committed offset is the *next* offset
    /// to read, so callers that commit the raw processed offset read one
    /// message twice after a restart; this crate commits `offset + 1`).
    pub fn mark_as_processed(&mut self, topic: &str, partition: PartitionId, offset: Offset) {
        self.state.entry((topic.to_owned(), partition)).or_insert_with(Default::default).processed = Some(offset);
    }

    /// Commits every partition whose processed offset has advanced past
    /// what was last committed, unconditionally (ignores the commit
    /// interval — callers on a timer should prefer
    /// `commit_offsets_if_necessary`).
    pub fn commit_offsets(&mut self, coordinator: &Broker, generation: &Generation) -> Result<()> {
        let mut by_topic: HashMap<String, Vec<(PartitionId, Offset)>> = HashMap::new();
        for (&(ref topic, partition), state) in &self.state {
            if let Some(processed) = state.processed {
                let next = processed + 1;
                if state.committed != Some(next) {
                    by_topic.entry(topic.clone()).or_insert_with(Vec::new).push((partition, next));
                }
            }
        }

        if by_topic.is_empty() {
            self.last_commit = Instant::now();
            return Ok(());
        }

        let topics: Vec<OffsetCommitTopic> = by_topic.iter()
            .map(|(topic, partitions)| {
                OffsetCommitTopic {
                    topic_name: topic.clone(),
                    partitions: partitions.iter()
                        .map(|&(partition, offset)| {
                            OffsetCommitPartition { partition: partition, offset: offset, metadata: None }
                        })
                        .collect(),
                }
            })
            .collect();

        let response = self.client
            .offset_commit(coordinator,
                          &generation.group_id,
                          generation.generation_id,
                          &generation.member_id,
                          self.retention_time_ms,
                          topics)?;

        for (topic, partitions) in response.topics {
            for (partition, error_code) in partitions {
                let code = KafkaCode::from(error_code);
                if code != KafkaCode::None {
                    warn!("offset commit for {}-{} failed: {:?}", topic, partition, code);
                    continue;
                }
                if let Some(offset) = by_topic.get(&topic).and_then(|ps| ps.iter().find(|&&(p, _)| p == partition)).map(|&(_, o)| o) {
                    self.state.entry((topic.clone(), partition)).or_insert_with(Default::default).committed = Some(offset);
                }
            }
        }

        self.last_commit = Instant::now();
        Ok(())
    }

    /// Commits only if `commit_interval` has elapsed since the last
    /// commit (successful or not); the shape `each_message`'s loop drives
    /// this through on every iteration.
    pub fn commit_offsets_if_necessary(&mut self, coordinator: &Broker, generation: &Generation) -> Result<()> {
        if self.last_commit.elapsed() < self.commit_interval {
            return Ok(());
        }
        self.commit_offsets(coordinator, generation)
    }

    /// Drops local state for any partition no longer in `assigned`, so a
    /// rebalance that takes partitions away doesn't keep committing to
    /// them. A new assignment replaces the old one; it never merges.
    pub fn clear_offsets_excluding(&mut self, assigned: &HashMap<String, Vec<PartitionId>>) {
        self.state.retain(|&(ref topic, partition), _| assigned.get(topic).map_or(false, |partitions| partitions.contains(&partition)));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use protocol::{FetchResponse, FetchTopic, GenerationId, HeartbeatResponse, JoinGroupProtocol,
                   JoinGroupResponse, LeaveGroupResponse, ListOffsetsResponse, ListOffsetsTopic,
                   OffsetCommitResponse, OffsetFetchPartition, OffsetFetchResponse, ResponseHeader,
                   SyncGroupAssignment, SyncGroupResponse};

    use super::*;

    fn header() -> ResponseHeader {
        ResponseHeader { correlation_id: 0 }
    }

    fn broker() -> Broker {
        Broker { node_id: 1, host: "localhost".to_owned(), port: 9092 }
    }

    fn generation() -> Generation {
        Generation { group_id: "g".to_owned(), generation_id: 7, member_id: "m1".to_owned() }
    }

    /// Reports no prior committed offset the first time, then records
    /// whatever `commit_offsets` sends it.
    struct FakeClient {
        fetched_offset: Offset,
        committed: RefCell<Vec<(String, PartitionId, Offset)>>,
    }

    impl Client for FakeClient {
        fn fetch(&self, _: &Broker, _: i32, _: i32, _: Vec<FetchTopic>) -> Result<FetchResponse> {
            unimplemented!()
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
        fn offset_commit(&self,
                         _coordinator: &Broker,
                         _group_id: &str,
                         _generation_id: GenerationId,
                         _member_id: &str,
                         _retention_time: i64,
                         topics: Vec<OffsetCommitTopic>)
                         -> Result<OffsetCommitResponse> {
            let mut committed = self.committed.borrow_mut();
            let mut out = Vec::new();
            for topic in topics {
                let mut partitions = Vec::new();
                for partition in topic.partitions {
                    committed.push((topic.topic_name.clone(), partition.partition, partition.offset));
                    partitions.push((partition.partition, 0));
                }
                out.push((topic.topic_name, partitions));
            }
            Ok(OffsetCommitResponse { header: header(), topics: out })
        }
        fn offset_fetch(&self, _coordinator: &Broker, _group_id: &str, topics: Vec<OffsetFetchTopic>) -> Result<OffsetFetchResponse> {
            let out = topics.into_iter()
                .map(|t| {
                    let partitions = t.partitions
                        .into_iter()
                        .map(|p| {
                            OffsetFetchPartition { partition: p, offset: self.fetched_offset, metadata: None, error_code: 0 }
                        })
                        .collect();
                    (t.topic_name, partitions)
                })
                .collect();
            Ok(OffsetFetchResponse { header: header(), topics: out })
        }
    }

    #[test]
    fn test_next_offset_for_falls_back_to_default_when_nothing_committed() {
        let client = FakeClient { fetched_offset: -1, committed: RefCell::new(Vec::new()) };
        let mut manager = OffsetManager::new(client, "g", -1, Duration::from_secs(10));
        manager.set_default_offset("t", FetchOffset::Earliest);

        let offset = manager.next_offset_for(&broker(), "t", 0).unwrap();
        assert_eq!(offset, FetchOffset::Earliest.to_wire());

        // Second call must not hit the broker again: cached state wins.
        let offset_again = manager.next_offset_for(&broker(), "t", 0).unwrap();
        assert_eq!(offset_again, offset);
    }

    #[test]
    fn test_next_offset_for_uses_committed_offset() {
        let client = FakeClient { fetched_offset: 42, committed: RefCell::new(Vec::new()) };
        let mut manager = OffsetManager::new(client, "g", -1, Duration::from_secs(10));

        assert_eq!(manager.next_offset_for(&broker(), "t", 0).unwrap(), 42);
    }

    #[test]
    fn test_mark_as_processed_advances_next_offset_by_one() {
        let client = FakeClient { fetched_offset: -1, committed: RefCell::new(Vec::new()) };
        let mut manager = OffsetManager::new(client, "g", -1, Duration::from_secs(10));

        manager.mark_as_processed("t", 0, 10);
        assert_eq!(manager.next_offset_for(&broker(), "t", 0).unwrap(), 11);
    }

    #[test]
    fn test_commit_offsets_sends_only_advanced_partitions() {
        let client = FakeClient { fetched_offset: -1, committed: RefCell::new(Vec::new()) };
        let mut manager = OffsetManager::new(client, "g", -1, Duration::from_secs(10));

        manager.mark_as_processed("t", 0, 5);
        manager.commit_offsets(&broker(), &generation()).unwrap();

        assert_eq!(*manager.client.committed.borrow(), vec![("t".to_owned(), 0, 6)]);

        // Nothing new processed: a second commit sends no requests.
        manager.client.committed.borrow_mut().clear();
        manager.commit_offsets(&broker(), &generation()).unwrap();
        assert!(manager.client.committed.borrow().is_empty());
    }

    #[test]
    fn test_clear_offsets_excluding_drops_unassigned_partitions() {
        let client = FakeClient { fetched_offset: -1, committed: RefCell::new(Vec::new()) };
        let mut manager = OffsetManager::new(client, "g", -1, Duration::from_secs(10));

        manager.mark_as_processed("t", 0, 1);
        manager.mark_as_processed("t", 1, 1);

        let mut assigned = HashMap::new();
        assigned.insert("t".to_owned(), vec![0]);
        manager.clear_offsets_excluding(&assigned);

        assert!(manager.state.contains_key(&("t".to_owned(), 0)));
        assert!(!manager.state.contains_key(&("t".to_owned(), 1)));
    }
}
