use bytes::{BufMut, Bytes, ByteOrder, BytesMut};
use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{Encodable, ErrorCode, GenerationId, RequestHeader, ResponseHeader, WriteExt,
               parse_bytes, parse_response_header, parse_string};

/// One `(name, metadata)` pair this member offers; the coordinator picks
/// the protocol name every member has in common.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupProtocol {
    pub protocol_name: String,
    pub protocol_metadata: Bytes,
}

// v0 only: no `rebalance_timeout` field. That was added in JoinGroup v1;
// this crate speaks the 0.9-era v0 wire shape (§4.6/§6), so encoding one
// here would desync the request body against a real broker.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub session_timeout: i32,
    /// Empty on first join; the broker assigns one and hands it back.
    pub member_id: String,
    pub protocol_type: String,
    pub group_protocols: Vec<JoinGroupProtocol>,
}

impl Encodable for JoinGroupRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;
        dst.put_str::<T, _>(Some(&self.group_id));
        dst.put_i32::<T>(self.session_timeout);
        dst.put_str::<T, _>(Some(&self.member_id));
        dst.put_str::<T, _>(Some(&self.protocol_type));
        dst.put_array::<T, _, _>(self.group_protocols.iter(), |buf, protocol| {
            buf.put_str::<T, _>(Some(&protocol.protocol_name));
            buf.put_bytes::<T, _>(Some(&protocol.protocol_metadata));
            Ok(())
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
    pub generation_id: GenerationId,
    pub protocol: String,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<JoinGroupMember>,
}

/// Present only in the response delivered to the elected group leader;
/// every other member gets an empty `members` list.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupMember {
    pub member_id: String,
    pub member_metadata: Bytes,
}

named!(pub parse_join_group_response<JoinGroupResponse>,
    do_parse!(
        header: parse_response_header
     >> error_code: be_i16
     >> generation_id: be_i32
     >> protocol: parse_string
     >> leader_id: parse_string
     >> member_id: parse_string
     >> members: length_count!(be_i32, parse_join_group_member)
     >> (JoinGroupResponse {
            header: header,
            error_code: error_code,
            generation_id: generation_id,
            protocol: protocol,
            leader_id: leader_id,
            member_id: member_id,
            members: members,
        })
    )
);

named!(parse_join_group_member<JoinGroupMember>,
    do_parse!(
        member_id: parse_string
     >> member_metadata: parse_bytes
     >> (JoinGroupMember {
            member_id: member_id,
            member_metadata: member_metadata.unwrap_or_default(),
        })
    )
);
