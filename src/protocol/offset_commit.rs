use bytes::{BufMut, ByteOrder, BytesMut};
use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{Encodable, ErrorCode, GenerationId, Offset, PartitionId, RequestHeader,
               ResponseHeader, WriteExt, parse_response_header, parse_string};

/// The group-coordinator-relative commit (v2 on the wire): offsets live in
/// the `__consumer_offsets` topic, keyed by `(group_id, generation_id,
/// member_id)` rather than committed directly by the client to ZooKeeper.
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
    /// `-1` asks the broker to use its configured default retention.
    pub retention_time: i64,
    pub topics: Vec<OffsetCommitTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetCommitPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitPartition {
    pub partition: PartitionId,
    pub offset: Offset,
    pub metadata: Option<String>,
}

impl Encodable for OffsetCommitRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        dst.put_i32::<T>(self.generation_id);
        dst.put_str::<T, _>(Some(&self.member_id));
        dst.put_i64::<T>(self.retention_time);
        dst.put_array::<T, _, _>(self.topics.iter(), |buf, topic| {
            buf.put_str::<T, _>(Some(&topic.topic_name));
            buf.put_array::<T, _, _>(topic.partitions.iter(), |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_i64::<T>(partition.offset);
                buf.put_str::<T, _>(partition.metadata.as_ref());
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitResponse {
    pub header: ResponseHeader,
    pub topics: Vec<(String, Vec<(PartitionId, ErrorCode)>)>,
}

named!(pub parse_offset_commit_response<OffsetCommitResponse>,
    do_parse!(
        header: parse_response_header
     >> topics: length_count!(be_i32, parse_offset_commit_topic)
     >> (OffsetCommitResponse { header: header, topics: topics })
    )
);

named!(parse_offset_commit_topic<(String, Vec<(PartitionId, ErrorCode)>)>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_offset_commit_partition)
     >> (topic_name, partitions)
    )
);

named!(parse_offset_commit_partition<(PartitionId, ErrorCode)>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> (partition, error_code)
    )
);
