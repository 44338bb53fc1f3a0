//! Tracks which topics this consumer has subscribed to, each topic's
//! configured default offset policy, and the partitions most recently
//! assigned to this member.

use std::collections::HashMap;

use protocol::{FetchOffset, PartitionId};

#[derive(Default)]
pub struct Subscriptions {
    topics: HashMap<String, FetchOffset>,
    assignment: HashMap<String, Vec<PartitionId>>,
}

impl Subscriptions {
    pub fn new() -> Subscriptions {
        Subscriptions::default()
    }

    pub fn subscribe(&mut self, topic: &str, default_offset: FetchOffset) {
        self.topics.insert(topic.to_owned(), default_offset);
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> Vec<&str> {
        self.topics.keys().map(|s| s.as_str()).collect()
    }

    pub fn default_offset(&self, topic: &str) -> FetchOffset {
        self.topics.get(topic).cloned().unwrap_or(FetchOffset::Earliest)
    }

    /// Records the assignment handed back by `SyncGroup` for this member.
    pub fn assign_from_subscribed(&mut self, assignment: HashMap<String, Vec<PartitionId>>) {
        self.assignment = assignment;
    }

    pub fn assigned_partitions(&self) -> &HashMap<String, Vec<PartitionId>> {
        &self.assignment
    }

    pub fn assigned_topic_partitions(&self) -> Vec<(String, PartitionId)> {
        self.assignment
            .iter()
            .flat_map(|(topic, partitions)| partitions.iter().map(move |&p| (topic.clone(), p)))
            .collect()
    }

    pub fn clear_assignment(&mut self) {
        self.assignment.clear();
    }
}
