use bytes::{BufMut, ByteOrder, BytesMut};
use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{Encodable, ErrorCode, Offset, PartitionId, RequestHeader, ResponseHeader,
               WriteExt, parse_opt_string, parse_response_header, parse_string};

/// Asks the coordinator for the last committed offset of each named
/// partition. `-1` in the response means "no committed offset."
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub topics: Vec<OffsetFetchTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchTopic {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

impl Encodable for OffsetFetchRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        dst.put_array::<T, _, _>(self.topics.iter(), |buf, topic| {
            buf.put_str::<T, _>(Some(&topic.topic_name));
            buf.put_array::<T, _, _>(topic.partitions.iter(), |buf, partition| {
                buf.put_i32::<T>(*partition);
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchResponse {
    pub header: ResponseHeader,
    pub topics: Vec<(String, Vec<OffsetFetchPartition>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchPartition {
    pub partition: PartitionId,
    pub offset: Offset,
    pub metadata: Option<String>,
    pub error_code: ErrorCode,
}

named!(pub parse_offset_fetch_response<OffsetFetchResponse>,
    do_parse!(
        header: parse_response_header
     >> topics: length_count!(be_i32, parse_offset_fetch_topic)
     >> (OffsetFetchResponse { header: header, topics: topics })
    )
);

named!(parse_offset_fetch_topic<(String, Vec<OffsetFetchPartition>)>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_offset_fetch_partition)
     >> (topic_name, partitions)
    )
);

named!(parse_offset_fetch_partition<OffsetFetchPartition>,
    do_parse!(
        partition: be_i32
     >> offset: be_i64
     >> metadata: parse_opt_string
     >> error_code: be_i16
     >> (OffsetFetchPartition {
            partition: partition,
            offset: offset,
            metadata: metadata,
            error_code: error_code,
        })
    )
);
