use bytes::{ByteOrder, BytesMut};
use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{Encodable, ErrorCode, NodeId, RequestHeader, ResponseHeader, WriteExt,
               parse_response_header, parse_string};

/// Locates the broker acting as coordinator for a consumer group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupCoordinatorRequest {
    pub header: RequestHeader,
    pub group_id: String,
}

impl Encodable for GroupCoordinatorRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupCoordinatorResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
    pub coordinator_id: NodeId,
    pub coordinator_host: String,
    pub coordinator_port: i32,
}

named!(pub parse_group_coordinator_response<GroupCoordinatorResponse>,
    do_parse!(
        header: parse_response_header
     >> error_code: be_i16
     >> coordinator_id: be_i32
     >> coordinator_host: parse_string
     >> coordinator_port: be_i32
     >> (GroupCoordinatorResponse {
            header: header,
            error_code: error_code,
            coordinator_id: coordinator_id,
            coordinator_host: coordinator_host,
            coordinator_port: coordinator_port,
        })
    )
);
