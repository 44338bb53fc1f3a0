use bytes::{BufMut, ByteOrder, BytesMut};
use nom::be_i16;

use errors::Result;
use protocol::{Encodable, ErrorCode, GenerationId, RequestHeader, ResponseHeader, WriteExt,
               parse_response_header};

#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
}

impl Encodable for HeartbeatRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        dst.put_i32::<T>(self.generation_id);
        dst.put_str::<T, _>(Some(&self.member_id));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
}

named!(pub parse_heartbeat_response<HeartbeatResponse>,
    do_parse!(
        header: parse_response_header
     >> error_code: be_i16
     >> (HeartbeatResponse { header: header, error_code: error_code })
    )
);
