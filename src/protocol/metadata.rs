use bytes::{ByteOrder, BytesMut};
use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{Encodable, NodeId, PartitionId, RequestHeader, ResponseHeader, WriteExt,
               parse_response_header, parse_string};

/// `MetadataRequest => [TopicName]`
///
/// An empty topic list asks the broker for metadata about every topic it
/// knows of.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRequest {
    pub header: RequestHeader,
    pub topic_names: Vec<String>,
}

impl Encodable for MetadataRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_array::<T, _, _>(self.topic_names.iter(), |buf, name| {
            buf.put_str::<T, _>(Some(name));
            Ok(())
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataResponse {
    pub header: ResponseHeader,
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: NodeId,
    pub host: String,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicMetadata {
    pub error_code: i16,
    pub topic_name: String,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: i16,
    pub partition_id: PartitionId,
    pub leader: NodeId,
    pub replicas: Vec<NodeId>,
    pub isr: Vec<NodeId>,
}

named!(pub parse_metadata_response<MetadataResponse>,
    do_parse!(
        header: parse_response_header
     >> brokers: length_count!(be_i32, parse_broker_metadata)
     >> topics: length_count!(be_i32, parse_topic_metadata)
     >> (MetadataResponse {
            header: header,
            brokers: brokers,
            topics: topics,
        })
    )
);

named!(parse_broker_metadata<BrokerMetadata>,
    do_parse!(
        node_id: be_i32
     >> host: parse_string
     >> port: be_i32
     >> (BrokerMetadata { node_id: node_id, host: host, port: port })
    )
);

named!(parse_topic_metadata<TopicMetadata>,
    do_parse!(
        error_code: be_i16
     >> topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_partition_metadata)
     >> (TopicMetadata {
            error_code: error_code,
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_partition_metadata<PartitionMetadata>,
    do_parse!(
        error_code: be_i16
     >> partition_id: be_i32
     >> leader: be_i32
     >> replicas: length_count!(be_i32, be_i32)
     >> isr: length_count!(be_i32, be_i32)
     >> (PartitionMetadata {
            error_code: error_code,
            partition_id: partition_id,
            leader: leader,
            replicas: replicas,
            isr: isr,
        })
    )
);
