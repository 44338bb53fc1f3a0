//! Partition assignment strategy selected by the `"standard"` group
//! protocol. The wire protocol only says "the leader chooses"; this crate
//! picks round-robin over partitions in canonical `(topic, partition)`
//! order across members sorted by member id, and documents it rather than
//! aiming for bit-compatibility with any other client.

use std::collections::HashMap;

use errors::Result;
use protocol::{PartitionId, Subscription};

/// A `(topic, partition)` pair, in the canonical ordering every assignor
/// must agree on: topics sorted lexically, partitions sorted numerically
/// within a topic.
pub type TopicPartition = (String, PartitionId);

/// Computes a partition assignment for one generation of a consumer
/// group. Implementations must be deterministic given the same inputs, so
/// that independently-running members (who only see their own half of the
/// computation, via `subscription`) end up agreeing on one canonical
/// assignment when the elected leader runs `assign`.
///
/// `assign` takes partition lookup as a closure rather than a `Cluster`
/// directly, so the whole strategy — and anything built on top of it —
/// can be exercised against a fixed topology in tests without opening a
/// socket.
pub trait PartitionAssignor: Send + Sync {
    /// The protocol name advertised in `JoinGroupProtocol` and matched
    /// against the coordinator's selected `protocol_name`.
    fn name(&self) -> &str;

    /// The subscription metadata this member advertises when joining.
    fn subscription(&self, topics: Vec<String>) -> Subscription {
        Subscription { topics: topics, user_data: None }
    }

    /// Called only by the elected group leader: given every member's
    /// advertised subscription, compute each member's partitions.
    /// `partitions_for(topic)` resolves a topic's current partition list.
    fn assign(&self,
             partitions_for: &Fn(&str) -> Result<Vec<PartitionId>>,
             subscriptions: &HashMap<String, Subscription>)
             -> Result<HashMap<String, Vec<TopicPartition>>>;
}

/// The round-robin scheme named `"standard"`. Assumes a uniform
/// subscription across the group (every member subscribes to the same
/// topic set), which is the common case this crate targets; a
/// heterogeneous subscription still produces a deterministic assignment,
/// just not necessarily one where every member only receives partitions
/// of topics it asked for.
pub struct RoundRobinAssignor;

impl PartitionAssignor for RoundRobinAssignor {
    fn name(&self) -> &str {
        "standard"
    }

    fn assign(&self,
             partitions_for: &Fn(&str) -> Result<Vec<PartitionId>>,
             subscriptions: &HashMap<String, Subscription>)
             -> Result<HashMap<String, Vec<TopicPartition>>> {
        let mut member_ids: Vec<String> = subscriptions.keys().cloned().collect();
        member_ids.sort();

        let mut result: HashMap<String, Vec<TopicPartition>> =
            member_ids.iter().map(|id| (id.clone(), Vec::new())).collect();

        if member_ids.is_empty() {
            return Ok(result);
        }

        let mut topics: Vec<String> = subscriptions.values().flat_map(|s| s.topics.clone()).collect();
        topics.sort();
        topics.dedup();

        let mut all_partitions: Vec<TopicPartition> = Vec::new();
        for topic in &topics {
            let mut partitions = partitions_for(topic)?;
            partitions.sort();
            for partition in partitions {
                all_partitions.push((topic.clone(), partition));
            }
        }

        for (i, tp) in all_partitions.into_iter().enumerate() {
            let member_id = &member_ids[i % member_ids.len()];
            result.get_mut(member_id).expect("member_id came from this map's keys").push(tp);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partitions_from(assignment: &HashMap<String, Vec<TopicPartition>>, member: &str) -> Vec<TopicPartition> {
        let mut v = assignment.get(member).cloned().unwrap_or_default();
        v.sort();
        v
    }

    #[test]
    fn test_round_robin_distributes_evenly() {
        let mut subscriptions = HashMap::new();
        subscriptions.insert("m1".to_owned(), Subscription { topics: vec!["t".to_owned()], user_data: None });
        subscriptions.insert("m2".to_owned(), Subscription { topics: vec!["t".to_owned()], user_data: None });

        let lookup = |topic: &str| -> Result<Vec<PartitionId>> {
            assert_eq!(topic, "t");
            Ok(vec![0, 1, 2, 3])
        };

        let assignment = RoundRobinAssignor.assign(&lookup, &subscriptions).unwrap();

        assert_eq!(partitions_from(&assignment, "m1"), vec![("t".to_owned(), 0), ("t".to_owned(), 2)]);
        assert_eq!(partitions_from(&assignment, "m2"), vec![("t".to_owned(), 1), ("t".to_owned(), 3)]);
    }

    #[test]
    fn test_empty_group_yields_empty_assignment() {
        let subscriptions = HashMap::new();
        let lookup = |_: &str| -> Result<Vec<PartitionId>> { Ok(Vec::new()) };
        let assignment = RoundRobinAssignor.assign(&lookup, &subscriptions).unwrap();
        assert!(assignment.is_empty());
    }
}
