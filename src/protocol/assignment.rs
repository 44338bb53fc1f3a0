//! Codecs for the opaque byte blobs the generic group-membership protocol
//! carries: the per-member subscription metadata sent in `JoinGroup`, and
//! the per-member assignment sent back in `SyncGroup`.
//!
//! Both share the same envelope: `version:i16 | topics:array<...> |
//! user_data:bytes`. The broker treats these bytes as opaque; only members
//! running the same `protocol_name` ("standard" here) need to agree on the
//! encoding.

use bytes::{BufMut, Bytes, ByteOrder, BytesMut};
use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{PartitionId, WriteExt, parse_bytes, parse_string};

pub const ASSIGNMENT_VERSION: i16 = 0;

/// The subscription metadata a member advertises in `JoinGroupProtocol`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Subscription {
    pub topics: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl Subscription {
    pub fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i16::<T>(ASSIGNMENT_VERSION);
        dst.put_array::<T, _, _>(self.topics.iter(), |buf, topic| {
            buf.put_str::<T, _>(Some(topic));
            Ok(())
        })?;
        dst.put_bytes::<T, _>(self.user_data.as_ref());
        Ok(())
    }
}

named!(pub parse_subscription<Subscription>,
    do_parse!(
        _version: be_i16
     >> topics: length_count!(be_i32, parse_string)
     >> user_data: parse_bytes
     >> (Subscription { topics: topics, user_data: user_data })
    )
);

/// `{version:i16, topics:[(topic, [partition…])], user_data:bytes}` — this
/// member's assignment as distributed by `SyncGroup`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MemberAssignment {
    pub partitions: Vec<AssignedTopicPartitions>,
    pub user_data: Option<Bytes>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignedTopicPartitions {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

impl MemberAssignment {
    pub fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i16::<T>(ASSIGNMENT_VERSION);
        dst.put_array::<T, _, _>(self.partitions.iter(), |buf, topic| {
            buf.put_str::<T, _>(Some(&topic.topic_name));
            buf.put_array::<T, _, _>(topic.partitions.iter(), |buf, partition| {
                buf.put_i32::<T>(*partition);
                Ok(())
            })
        })?;
        dst.put_bytes::<T, _>(self.user_data.as_ref());
        Ok(())
    }

    pub fn to_bytes<T: ByteOrder>(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        self.encode::<T>(&mut buf)?;
        Ok(buf.freeze())
    }
}

named!(pub parse_member_assignment<MemberAssignment>,
    do_parse!(
        _version: be_i16
     >> partitions: length_count!(be_i32, parse_assigned_topic_partitions)
     >> user_data: parse_bytes
     >> (MemberAssignment { partitions: partitions, user_data: user_data })
    )
);

named!(parse_assigned_topic_partitions<AssignedTopicPartitions>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, be_i32)
     >> (AssignedTopicPartitions { topic_name: topic_name, partitions: partitions })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use super::*;

    #[test]
    fn test_roundtrip_subscription() {
        let subscription = Subscription {
            topics: vec!["orders".to_owned(), "payments".to_owned()],
            user_data: None,
        };

        let mut buf = BytesMut::with_capacity(64);
        subscription.encode::<BigEndian>(&mut buf).unwrap();

        match parse_subscription(&buf[..]) {
            ::nom::IResult::Done(rest, decoded) => {
                assert!(rest.is_empty());
                assert_eq!(decoded, subscription);
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_member_assignment() {
        let assignment = MemberAssignment {
            partitions: vec![AssignedTopicPartitions {
                                  topic_name: "orders".to_owned(),
                                  partitions: vec![0, 1, 2],
                              }],
            user_data: None,
        };

        let bytes = assignment.to_bytes::<BigEndian>().unwrap();

        match parse_member_assignment(&bytes[..]) {
            ::nom::IResult::Done(rest, decoded) => {
                assert!(rest.is_empty());
                assert_eq!(decoded, assignment);
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }
}
