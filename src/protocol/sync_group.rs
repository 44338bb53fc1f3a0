use bytes::{BufMut, Bytes, ByteOrder, BytesMut};
use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{Encodable, ErrorCode, GenerationId, RequestHeader, ResponseHeader, WriteExt,
               parse_bytes, parse_response_header, parse_string};

/// The leader's computed assignment for one member; non-leaders send an
/// empty `group_assignment` list instead.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncGroupAssignment {
    pub member_id: String,
    pub member_assignment: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
    pub group_assignment: Vec<SyncGroupAssignment>,
}

impl Encodable for SyncGroupRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        dst.put_i32::<T>(self.generation_id);
        dst.put_str::<T, _>(Some(&self.member_id));
        dst.put_array::<T, _, _>(self.group_assignment.iter(), |buf, assignment| {
            buf.put_str::<T, _>(Some(&assignment.member_id));
            buf.put_bytes::<T, _>(Some(&assignment.member_assignment));
            Ok(())
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncGroupResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
    pub member_assignment: Bytes,
}

named!(pub parse_sync_group_response<SyncGroupResponse>,
    do_parse!(
        header: parse_response_header
     >> error_code: be_i16
     >> member_assignment: parse_bytes
     >> (SyncGroupResponse {
            header: header,
            error_code: error_code,
            member_assignment: member_assignment.unwrap_or_default(),
        })
    )
);
