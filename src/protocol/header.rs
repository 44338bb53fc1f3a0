use bytes::{BufMut, ByteOrder, BytesMut};
use nom::be_i32;

use errors::Result;
use protocol::{ApiKey, ApiVersion, CorrelationId, WriteExt, parse_string};

/// `size:i32 | api_key:i16 | api_version:i16 | correlation_id:i32 |
/// client_id:string | body` — the envelope every request carries.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: ApiVersion,
    pub correlation_id: CorrelationId,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i16::<T>(self.api_key);
        dst.put_i16::<T>(self.api_version);
        dst.put_i32::<T>(self.correlation_id);
        dst.put_str::<T, _>(self.client_id.as_ref());
        Ok(())
    }
}

/// `size:i32 | correlation_id:i32 | body` — the envelope every response
/// carries. `size` itself is stripped by the connection's framing before
/// this is parsed; only `correlation_id` remains at the front of the body.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseHeader {
    pub correlation_id: CorrelationId,
}

named!(pub parse_response_header<ResponseHeader>,
    do_parse!(
        correlation_id: be_i32
     >> (ResponseHeader { correlation_id: correlation_id })
    )
);
