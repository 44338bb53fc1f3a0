//! The Kafka 0.9 wire protocol: primitive encoding, per-API request and
//! response types, and the message-set codec.
//!
//! Every integer on the wire is big-endian. A *string* is an `int16` length
//! followed by UTF-8 bytes (`-1` is the null string); *bytes* is an `int32`
//! length followed by raw bytes (`-1` is null); an *array* is an `int32`
//! count followed by that many homogeneous items. None of this is
//! self-describing — encoder and decoder must agree statically on the
//! shape, which is why each API below gets its own request/response pair
//! rather than a generic envelope.

use std::mem;
use std::str;
use std::borrow::Cow;

use bytes::{BufMut, ByteOrder, Bytes, BytesMut};
use nom::{be_i16, be_i32};

use errors::Result;

mod header;
mod message;
mod metadata;
mod fetch;
mod list_offsets;
mod group_coordinator;
mod join_group;
mod sync_group;
mod heartbeat;
mod leave_group;
mod offset_commit;
mod offset_fetch;
mod assignment;

pub use self::header::{RequestHeader, ResponseHeader, parse_response_header};
pub use self::message::{Compression, Message, MessageSet, MessageSetEncoder, MessageTimestamp,
                        parse_message_set};
pub use self::metadata::{BrokerMetadata, MetadataRequest, MetadataResponse, PartitionMetadata,
                         TopicMetadata, parse_metadata_response};
pub use self::fetch::{FetchPartition, FetchRequest, FetchTopic, PartitionData, TopicData,
                      FetchResponse, parse_fetch_response};
pub use self::list_offsets::{ListOffsetsPartition, ListOffsetsRequest, ListOffsetsTopic,
                             ListOffsetsResponse, ListOffsetsPartitionResponse,
                             ListOffsetsTopicResponse, parse_list_offsets_response};
pub use self::group_coordinator::{GroupCoordinatorRequest, GroupCoordinatorResponse,
                                  parse_group_coordinator_response};
pub use self::join_group::{JoinGroupMember, JoinGroupProtocol, JoinGroupRequest,
                           JoinGroupResponse, parse_join_group_response};
pub use self::sync_group::{SyncGroupAssignment, SyncGroupRequest, SyncGroupResponse,
                           parse_sync_group_response};
pub use self::heartbeat::{HeartbeatRequest, HeartbeatResponse, parse_heartbeat_response};
pub use self::leave_group::{LeaveGroupRequest, LeaveGroupResponse, parse_leave_group_response};
pub use self::offset_commit::{OffsetCommitPartition, OffsetCommitRequest, OffsetCommitResponse,
                              OffsetCommitTopic, parse_offset_commit_response};
pub use self::offset_fetch::{OffsetFetchPartition, OffsetFetchRequest, OffsetFetchResponse,
                             OffsetFetchTopic, parse_offset_fetch_response};
pub use self::assignment::{ASSIGNMENT_VERSION, AssignedTopicPartitions, MemberAssignment,
                           Subscription, parse_member_assignment, parse_subscription};

/// Numeric codes the `api_key` field of a request envelope can take.
///
/// Produce (0) is carried purely so the tagged dispatch in `ApiKeys` stays
/// complete and `from`/`into` round-trips for any byte the broker sends
/// back; this crate never builds a `ProduceRequest` (the producer is an
/// external collaborator, out of scope here).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    Offsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
}

impl ApiKeys {
    pub fn from_i16(v: i16) -> Option<ApiKeys> {
        match v {
            0 => Some(ApiKeys::Produce),
            1 => Some(ApiKeys::Fetch),
            2 => Some(ApiKeys::Offsets),
            3 => Some(ApiKeys::Metadata),
            8 => Some(ApiKeys::OffsetCommit),
            9 => Some(ApiKeys::OffsetFetch),
            10 => Some(ApiKeys::GroupCoordinator),
            11 => Some(ApiKeys::JoinGroup),
            12 => Some(ApiKeys::Heartbeat),
            13 => Some(ApiKeys::LeaveGroup),
            14 => Some(ApiKeys::SyncGroup),
            _ => None,
        }
    }
}

/// Node identifier assigned by the cluster.
pub type NodeId = i32;
/// Identifies one partition within a topic.
pub type PartitionId = i32;
/// A 64-bit monotonic position within one partition's log.
pub type Offset = i64;
/// Milliseconds since the epoch.
pub type Timestamp = i64;
/// Numeric error code returned by a broker.
pub type ErrorCode = i16;
/// The `api_version` field of a request/response envelope.
pub type ApiVersion = i16;
/// The `api_key` field of a request/response envelope, before it has been
/// validated against `ApiKeys`.
pub type ApiKey = i16;
/// Client-assigned, per-connection monotonic request identifier.
pub type CorrelationId = i32;
/// Identifies one incarnation of a consumer group's membership.
pub type GenerationId = i32;

/// `-2`: "start from the earliest offset still retained."
pub const EARLIEST_OFFSET: Offset = -2;
/// `-1`: "start from the offset of the next message produced."
pub const LATEST_OFFSET: Offset = -1;

/// The default offset policy applied when a partition has no committed
/// offset in the group's offset store.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FetchOffset {
    Earliest,
    Latest,
    /// An explicit offset, usually produced by `OffsetFetch`.
    Offset(Offset),
}

impl FetchOffset {
    pub fn to_wire(&self) -> Offset {
        match *self {
            FetchOffset::Earliest => EARLIEST_OFFSET,
            FetchOffset::Latest => LATEST_OFFSET,
            FetchOffset::Offset(offset) => offset,
        }
    }
}

/// A type that can serialize itself onto the wire, generic over byte order
/// so tests can exercise both endiannesses even though Kafka only ever uses
/// big-endian in practice.
pub trait Encodable {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()>;
}

/// `BufMut` helpers for the Kafka string/bytes/array conventions.
pub trait WriteExt: BufMut + Sized {
    fn put_str<T: ByteOrder, S: AsRef<str>>(&mut self, s: Option<S>) {
        match s {
            Some(s) => {
                let s = s.as_ref();
                self.put_i16::<T>(s.len() as i16);
                self.put_slice(s.as_bytes());
            }
            None => self.put_i16::<T>(-1),
        }
    }

    fn put_bytes<T: ByteOrder, B: AsRef<[u8]>>(&mut self, b: Option<B>) {
        match b {
            Some(b) => {
                let b = b.as_ref();
                self.put_i32::<T>(b.len() as i32);
                self.put_slice(b);
            }
            None => self.put_i32::<T>(-1),
        }
    }

    fn put_array<T: ByteOrder, I, F>(&mut self, items: I, mut f: F) -> Result<()>
        where I: IntoIterator,
              I::IntoIter: ExactSizeIterator,
              F: FnMut(&mut Self, I::Item) -> Result<()>
    {
        let items = items.into_iter();
        self.put_i32::<T>(items.len() as i32);
        for item in items {
            f(self, item)?;
        }
        Ok(())
    }
}

impl<B: BufMut> WriteExt for B {}

named!(pub parse_str<Option<Cow<str>>>,
    do_parse!(
        len: be_i16
     >> s: cond!(len > 0, map!(map_res!(take!(len), str::from_utf8), Cow::from))
     >> (s)
    )
);

// A legal empty string (wire length 0) is common in broker error replies
// (e.g. `coordinator_host`/`member_id` on a GroupCoordinatorNotAvailable or
// UnknownMemberId response) and must parse to `""`, not fail the decoder —
// only `-1` is null, and this type has no null to represent anyway, so
// both `0` and `-1` collapse to the empty string.
named!(pub parse_string<String>,
    map!(parse_opt_string, |s: Option<String>| s.unwrap_or_default())
);

named!(pub parse_opt_string<Option<String>>,
    do_parse!(
        len: be_i16
     >> s: cond!(len > 0, map!(map_res!(take!(len), str::from_utf8), ToOwned::to_owned))
     >> (s)
    )
);

named!(pub parse_bytes<Option<Bytes>>,
    do_parse!(
        len: be_i32
     >> b: cond!(len > 0, map!(take!(len), Bytes::from))
     >> (b)
    )
);

named!(pub parse_owned_bytes<Bytes>,
    do_parse!(
        len: be_i32
     >> b: cond_reduce!(len >= 0, map!(take!(if len < 0 { 0 } else { len }), Bytes::from))
     >> (b)
    )
);
