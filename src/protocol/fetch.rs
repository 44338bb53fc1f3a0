use bytes::{BufMut, ByteOrder, BytesMut};
use nom::{be_i16, be_i32, be_i64};

use errors::{Error, ErrorKind, KafkaCode, Result};
use protocol::{ApiVersion, Encodable, ErrorCode, MessageSet, Offset, PartitionId, RequestHeader,
               ResponseHeader, WriteExt, parse_message_set, parse_response_header, parse_string};

/// `FetchRequest => ReplicaId MaxWaitTime MinBytes [TopicName [Partition
/// FetchOffset MaxBytes]]`
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub header: RequestHeader,
    /// Always `-1` for a regular consumer (not a replicating broker).
    pub replica_id: i32,
    pub max_wait_time: i32,
    pub min_bytes: i32,
    pub topics: Vec<FetchTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchTopic {
    pub topic_name: String,
    pub partitions: Vec<FetchPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchPartition {
    pub partition: PartitionId,
    pub fetch_offset: Offset,
    pub max_bytes: i32,
}

impl Encodable for FetchRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_i32::<T>(self.replica_id);
        dst.put_i32::<T>(self.max_wait_time);
        dst.put_i32::<T>(self.min_bytes);
        dst.put_array::<T, _, _>(self.topics.iter(), |buf, topic| {
            buf.put_str::<T, _>(Some(&topic.topic_name));
            buf.put_array::<T, _, _>(topic.partitions.iter(), |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_i64::<T>(partition.fetch_offset);
                buf.put_i32::<T>(partition.max_bytes);
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchResponse {
    pub header: ResponseHeader,
    pub topics: Vec<TopicData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicData {
    pub topic_name: String,
    pub partitions: Vec<PartitionData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionData {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    /// The offset at the end of the log for this partition.
    pub highwater_mark_offset: Offset,
    pub message_set: MessageSet,
}

pub fn parse_fetch_response(input: &[u8], api_version: ApiVersion) -> ::nom::IResult<&[u8], FetchResponse> {
    do_parse!(input,
        header: parse_response_header
     >> topics: length_count!(be_i32, apply!(parse_fetch_topic_data, api_version))
     >> (FetchResponse { header: header, topics: topics })
    )
}

fn parse_fetch_topic_data(input: &[u8], api_version: ApiVersion) -> ::nom::IResult<&[u8], TopicData> {
    do_parse!(input,
        topic_name: parse_string
     >> partitions: length_count!(be_i32, apply!(parse_fetch_partition_data, api_version))
     >> (TopicData { topic_name: topic_name, partitions: partitions })
    )
}

fn parse_fetch_partition_data(input: &[u8], api_version: ApiVersion) -> ::nom::IResult<&[u8], PartitionData> {
    do_parse!(input,
        partition: be_i32
     >> error_code: be_i16
     >> offset: be_i64
     >> message_set_bytes: length_value!(be_i32, ::nom::rest)
     >> (match parse_message_set(message_set_bytes, api_version) {
            Ok(set) => PartitionData {
                partition: partition,
                error_code: error_code,
                highwater_mark_offset: offset,
                message_set: set,
            },
            // A truncated trailing message is already handled inside
            // `parse_message_set` (it just drops the partial tail). An
            // `Err` here means a *complete* frame failed its CRC or named
            // an unsupported codec — a data-integrity error that must
            // surface to the caller (§7), not an empty message set with
            // no error, which would make the consumer re-fetch the same
            // offset forever. Fold it into the partition's own error
            // code so one corrupt partition doesn't fail the whole batch.
            Err(err) => PartitionData {
                partition: partition,
                error_code: fetch_partition_error_code(error_code, &err),
                highwater_mark_offset: offset,
                message_set: MessageSet::default(),
            },
        })
    )
}

fn fetch_partition_error_code(wire_error_code: ErrorCode, err: &Error) -> ErrorCode {
    if wire_error_code != 0 {
        return wire_error_code;
    }
    match *err.kind() {
        ErrorKind::KafkaError(code) => code as ErrorCode,
        _ => KafkaCode::InvalidMessageSize as ErrorCode,
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BigEndian, BytesMut};

    use super::*;
    use protocol::{Message, MessageSetEncoder};

    #[test]
    fn test_encode_fetch_request() {
        let req = FetchRequest {
            header: RequestHeader {
                api_key: 1,
                api_version: 0,
                correlation_id: 1,
                client_id: None,
            },
            replica_id: -1,
            max_wait_time: 100,
            min_bytes: 1,
            topics: vec![FetchTopic {
                             topic_name: "t".to_owned(),
                             partitions: vec![FetchPartition {
                                                  partition: 0,
                                                  fetch_offset: 10,
                                                  max_bytes: 1024,
                                              }],
                         }],
        };

        let mut buf = BytesMut::with_capacity(128);
        req.encode::<BigEndian>(&mut buf).unwrap();
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_parse_fetch_response_yields_messages_in_order() {
        let mut message_set_buf = BytesMut::with_capacity(128);
        let set = ::protocol::MessageSet {
            messages: vec![Message {
                               offset: 5,
                               timestamp: None,
                               compression: ::protocol::Compression::None,
                               key: None,
                               value: Some(::bytes::Bytes::from(&b"a"[..])),
                           },
                           Message {
                               offset: 6,
                               timestamp: None,
                               compression: ::protocol::Compression::None,
                               key: None,
                               value: Some(::bytes::Bytes::from(&b"b"[..])),
                           }],
        };
        MessageSetEncoder::new(0).encode::<BigEndian>(&set, &mut message_set_buf).unwrap();
        // drop the leading array-count int32; partition data embeds raw
        // message bytes, not an array-length-prefixed one.
        let message_set_bytes = &message_set_buf[4..];

        let mut body = vec![0, 0, 0, 9]; // correlation_id
        body.extend(&[0, 0, 0, 1]); // 1 topic
        body.extend(&[0, 1, b't']);
        body.extend(&[0, 0, 0, 1]); // 1 partition
        body.extend(&[0, 0, 0, 0]); // partition 0
        body.extend(&[0, 0]); // error code
        body.extend(&[0, 0, 0, 0, 0, 0, 0, 10]); // high watermark 10
        body.extend(&(message_set_bytes.len() as i32).to_be_bytes().to_vec());
        body.extend_from_slice(message_set_bytes);

        match parse_fetch_response(&body, 0) {
            ::nom::IResult::Done(rest, res) => {
                assert!(rest.is_empty());
                let partitions = &res.topics[0].partitions;
                assert_eq!(partitions[0].message_set.messages.len(), 2);
                assert_eq!(partitions[0].message_set.messages[0].offset, 5);
                assert_eq!(partitions[0].message_set.messages[1].offset, 6);
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_fetch_response_surfaces_corrupt_message_as_a_partition_error() {
        use errors::KafkaCode;

        let mut message_set_buf = BytesMut::with_capacity(128);
        let set = ::protocol::MessageSet {
            messages: vec![Message {
                               offset: 0,
                               timestamp: None,
                               compression: ::protocol::Compression::None,
                               key: None,
                               value: Some(::bytes::Bytes::from(&b"value"[..])),
                           }],
        };
        MessageSetEncoder::new(0).encode::<BigEndian>(&set, &mut message_set_buf).unwrap();
        let mut message_set_bytes = message_set_buf[4..].to_vec();
        // flip a bit inside the value payload, after the CRC
        let last = message_set_bytes.len() - 1;
        message_set_bytes[last] ^= 0x01;

        let mut body = vec![0, 0, 0, 9]; // correlation_id
        body.extend(&[0, 0, 0, 1]); // 1 topic
        body.extend(&[0, 1, b't']);
        body.extend(&[0, 0, 0, 1]); // 1 partition
        body.extend(&[0, 0, 0, 0]); // partition 0
        body.extend(&[0, 0]); // wire error code: none
        body.extend(&[0, 0, 0, 0, 0, 0, 0, 1]); // high watermark 1
        body.extend(&(message_set_bytes.len() as i32).to_be_bytes().to_vec());
        body.extend_from_slice(&message_set_bytes);

        match parse_fetch_response(&body, 0) {
            ::nom::IResult::Done(rest, res) => {
                assert!(rest.is_empty());
                let partition = &res.topics[0].partitions[0];
                // A corrupt message must surface as the partition's own
                // error code with an empty message set, never as an empty
                // set with error_code left at 0 — the consumer would
                // otherwise treat it as "no new messages yet" and
                // re-fetch the same offset forever instead of surfacing
                // the data-integrity error.
                assert_eq!(partition.error_code, KafkaCode::CorruptMessage as i16);
                assert!(partition.message_set.messages.is_empty());
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }
}
