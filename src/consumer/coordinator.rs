//! The join → sync → heartbeat → leave state machine run against whichever
//! broker is elected *group coordinator* for this `group_id`. This
//! is the heart of the crate: the rest of `consumer/` exists to feed and
//! drain this state machine.
//!
//! Coordinator discovery (and cache invalidation on a stale coordinator)
//! is the caller's job, not this type's: `join`/`heartbeat`/`leave` take
//! the resolved `Broker` as a plain argument, so this whole state machine
//! can be driven against a fake `Client` in tests without ever touching a
//! `Cluster` or a socket.

use std::collections::HashMap;

use bytes::{BigEndian, Bytes, BytesMut};

use client::{Broker, Client};
use consumer::assignor::{PartitionAssignor, RoundRobinAssignor, TopicPartition};
use errors::{ErrorKind, KafkaCode, Result};
use protocol::{AssignedTopicPartitions, GenerationId, JoinGroupProtocol, MemberAssignment,
              PartitionId, Subscription, SyncGroupAssignment, parse_member_assignment,
              parse_subscription};

const PROTOCOL_TYPE: &str = "consumer";

/// One incarnation of this member's participation in a group. The triple
/// travels together on every `SyncGroup`/`Heartbeat`/`OffsetCommit` call,
/// and a rebalance invalidates it as a unit — never just one field.
#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
}

#[derive(Debug)]
enum State {
    Unjoined,
    Stable(Generation),
}

/// Drives one member's membership in a consumer group: `join()` runs the
/// full JoinGroup/SyncGroup exchange (computing the assignment itself when
/// elected leader), `heartbeat()` keeps the session alive and reports
/// whether the caller must rejoin, `leave()` is best-effort cleanup.
pub struct ConsumerCoordinator<C: Client> {
    client: C,
    group_id: String,
    session_timeout_ms: i32,
    assignor: Box<PartitionAssignor>,
    state: State,
    assignment: HashMap<String, Vec<PartitionId>>,
}

impl<C: Client> ConsumerCoordinator<C> {
    pub fn new(client: C, group_id: &str, session_timeout_ms: i32) -> Self {
        ConsumerCoordinator {
            client: client,
            group_id: group_id.to_owned(),
            session_timeout_ms: session_timeout_ms,
            assignor: Box::new(RoundRobinAssignor),
            state: State::Unjoined,
            assignment: HashMap::new(),
        }
    }

    pub fn is_member(&self) -> bool {
        match self.state {
            State::Stable(_) => true,
            State::Unjoined => false,
        }
    }

    pub fn generation(&self) -> Option<&Generation> {
        match self.state {
            State::Stable(ref generation) => Some(generation),
            State::Unjoined => None,
        }
    }

    pub fn assigned_partitions(&self) -> &HashMap<String, Vec<PartitionId>> {
        &self.assignment
    }

    /// Runs `JoinGroup` then `SyncGroup` against `coordinator`, computing
    /// and distributing the assignment if this member turns out to be
    /// group leader. `partitions_for` resolves each
    /// subscribed topic's partition list (normally `Cluster::partitions_for`,
    /// swapped for a fixed map in tests).
    pub fn join<F>(&mut self, topics: &[&str], coordinator: &Broker, partitions_for: F) -> Result<()>
        where F: Fn(&str) -> Result<Vec<PartitionId>>
    {
        let member_id = match self.state {
            State::Stable(ref generation) => generation.member_id.clone(),
            State::Unjoined => String::new(),
        };

        let subscription = self.assignor.subscription(topics.iter().map(|s| s.to_string()).collect());
        let metadata = encode_subscription(&subscription)?;

        let response = self.client
            .join_group(coordinator,
                       &self.group_id,
                       self.session_timeout_ms,
                       &member_id,
                       PROTOCOL_TYPE,
                       vec![JoinGroupProtocol {
                                protocol_name: RoundRobinAssignor.name().to_owned(),
                                protocol_metadata: metadata,
                            }])?;

        let code = KafkaCode::from(response.error_code);
        if code != KafkaCode::None {
            bail!(ErrorKind::KafkaError(code));
        }

        let is_leader = response.leader_id == response.member_id;

        let group_assignment = if is_leader {
            let mut subscriptions = HashMap::new();
            for member in &response.members {
                let decoded = decode_nom(parse_subscription(&member.member_metadata))?;
                subscriptions.insert(member.member_id.clone(), decoded);
            }

            let assignments = self.assignor.assign(&partitions_for, &subscriptions)?;

            let mut group_assignment = Vec::with_capacity(assignments.len());
            for (member_id, partitions) in assignments {
                let member_assignment = to_member_assignment(partitions);
                group_assignment.push(SyncGroupAssignment {
                    member_id: member_id,
                    member_assignment: member_assignment.to_bytes::<BigEndian>()?,
                });
            }
            group_assignment
        } else {
            Vec::new()
        };

        let sync_response = self.client
            .sync_group(coordinator,
                       &self.group_id,
                       response.generation_id,
                       &response.member_id,
                       group_assignment)?;

        let sync_code = KafkaCode::from(sync_response.error_code);
        if sync_code != KafkaCode::None {
            bail!(ErrorKind::KafkaError(sync_code));
        }

        let assignment = decode_nom(parse_member_assignment(&sync_response.member_assignment))?;
        self.assignment = assignment.partitions
            .into_iter()
            .map(|tp| (tp.topic_name, tp.partitions))
            .collect();

        debug!("group {} joined as {} (generation {}, leader={})",
              self.group_id,
              response.member_id,
              response.generation_id,
              is_leader);

        self.state = State::Stable(Generation {
            group_id: self.group_id.clone(),
            generation_id: response.generation_id,
            member_id: response.member_id,
        });

        Ok(())
    }

    /// Sends `Heartbeat` against `coordinator`; on any non-`None` error
    /// code, drops local state to `Unjoined` before propagating, so the
    /// caller's next `join()` starts clean. Callers should additionally
    /// drop their coordinator cache on `GroupCoordinatorNotAvailable` /
    /// `NotCoordinatorForGroup`.
    pub fn heartbeat(&mut self, coordinator: &Broker) -> Result<()> {
        let generation = match self.state {
            State::Stable(ref generation) => generation.clone(),
            State::Unjoined => return Ok(()),
        };

        let response = self.client.heartbeat(coordinator, &generation.group_id, generation.generation_id, &generation.member_id)?;
        let code = KafkaCode::from(response.error_code);

        if code == KafkaCode::None {
            return Ok(());
        }

        warn!("heartbeat for group {} failed: {:?}", self.group_id, code);
        self.state = State::Unjoined;
        bail!(ErrorKind::KafkaError(code))
    }

    /// Best-effort `LeaveGroup` against `coordinator`; errors are
    /// swallowed. Local state is always cleared.
    pub fn leave(&mut self, coordinator: &Broker) {
        if let State::Stable(ref generation) = self.state {
            if let Err(err) = self.client.leave_group(coordinator, &generation.group_id, &generation.member_id) {
                warn!("leave_group for {} failed, ignoring: {}", generation.group_id, err);
            }
        }
        self.state = State::Unjoined;
        self.assignment.clear();
    }
}

fn encode_subscription(subscription: &Subscription) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    subscription.encode::<BigEndian>(&mut buf)?;
    Ok(buf.freeze())
}

fn to_member_assignment(partitions: Vec<TopicPartition>) -> MemberAssignment {
    let mut by_topic: HashMap<String, Vec<PartitionId>> = HashMap::new();
    for (topic, partition) in partitions {
        by_topic.entry(topic).or_insert_with(Vec::new).push(partition);
    }

    let mut topics: Vec<AssignedTopicPartitions> = by_topic.into_iter()
        .map(|(topic_name, mut partitions)| {
            partitions.sort();
            AssignedTopicPartitions { topic_name: topic_name, partitions: partitions }
        })
        .collect();
    topics.sort_by(|a, b| a.topic_name.cmp(&b.topic_name));

    MemberAssignment { partitions: topics, user_data: None }
}

fn decode_nom<O>(result: ::nom::IResult<&[u8], O>) -> Result<O> {
    match result {
        ::nom::IResult::Done(_, out) => Ok(out),
        ::nom::IResult::Incomplete(_) => Err(ErrorKind::CodecError("incomplete embedded group-protocol bytes").into()),
        ::nom::IResult::Error(_) => Err(ErrorKind::CodecError("malformed embedded group-protocol bytes").into()),
    }
}
