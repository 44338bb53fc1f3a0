use bytes::{BufMut, ByteOrder, BytesMut};
use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{Encodable, ErrorCode, Offset, PartitionId, RequestHeader, ResponseHeader,
               WriteExt, parse_response_header, parse_string};

/// `Offsets` (api key 2): translate the `:earliest`/`:latest` sentinels to
/// concrete offsets, or list candidate offsets around a given timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsRequest {
    pub header: RequestHeader,
    pub replica_id: i32,
    pub topics: Vec<ListOffsetsTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsTopic {
    pub topic_name: String,
    pub partitions: Vec<ListOffsetsPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsPartition {
    pub partition: PartitionId,
    /// The sentinel (`-2`/`-1`) or an explicit timestamp to search from.
    pub timestamp: Offset,
    pub max_num_offsets: i32,
}

impl Encodable for ListOffsetsRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_i32::<T>(self.replica_id);
        dst.put_array::<T, _, _>(self.topics.iter(), |buf, topic| {
            buf.put_str::<T, _>(Some(&topic.topic_name));
            buf.put_array::<T, _, _>(topic.partitions.iter(), |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_i64::<T>(partition.timestamp);
                buf.put_i32::<T>(partition.max_num_offsets);
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsResponse {
    pub header: ResponseHeader,
    pub topics: Vec<ListOffsetsTopicResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsTopicResponse {
    pub topic_name: String,
    pub partitions: Vec<ListOffsetsPartitionResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsPartitionResponse {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offsets: Vec<Offset>,
}

named!(pub parse_list_offsets_response<ListOffsetsResponse>,
    do_parse!(
        header: parse_response_header
     >> topics: length_count!(be_i32, parse_list_offsets_topic)
     >> (ListOffsetsResponse { header: header, topics: topics })
    )
);

named!(parse_list_offsets_topic<ListOffsetsTopicResponse>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_list_offsets_partition)
     >> (ListOffsetsTopicResponse { topic_name: topic_name, partitions: partitions })
    )
);

named!(parse_list_offsets_partition<ListOffsetsPartitionResponse>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> offsets: length_count!(be_i32, be_i64)
     >> (ListOffsetsPartitionResponse {
            partition: partition,
            error_code: error_code,
            offsets: offsets,
        })
    )
);
