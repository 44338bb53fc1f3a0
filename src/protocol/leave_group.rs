use bytes::{ByteOrder, BytesMut};
use nom::be_i16;

use errors::Result;
use protocol::{Encodable, ErrorCode, RequestHeader, ResponseHeader, WriteExt,
               parse_response_header};

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub member_id: String,
}

impl Encodable for LeaveGroupRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        dst.put_str::<T, _>(Some(&self.member_id));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveGroupResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
}

named!(pub parse_leave_group_response<LeaveGroupResponse>,
    do_parse!(
        header: parse_response_header
     >> error_code: be_i16
     >> (LeaveGroupResponse { header: header, error_code: error_code })
    )
);
