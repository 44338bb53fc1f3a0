use std::mem;

use bytes::{BufMut, ByteOrder, Bytes, BytesMut};
use nom::{IResult, be_i16, be_i32, be_i64, be_i8};
use crc::crc32;
use time;

use errors::{ErrorKind, KafkaCode, Result};
use protocol::{ApiVersion, Offset, Timestamp, WriteExt, parse_bytes};

const TIMESTAMP_TYPE_MASK: i8 = 0x08;
const COMPRESSION_CODEC_MASK: i8 = 0x07;

/// The low three bits of a message's `attributes` byte name a compression
/// codec. This crate recognises the bit positions (the framing hook the
/// spec calls for) but implements only `None`; anything else is a named
/// non-goal and surfaces as `ErrorKind::UnsupportedCompression` instead of
/// silently misreading the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None = 0,
    Gzip = 1,
    Snappy = 2,
    Lz4 = 3,
}

impl Compression {
    fn from_attributes(attrs: i8) -> Result<Compression> {
        match attrs & COMPRESSION_CODEC_MASK {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Snappy),
            3 => Ok(Compression::Lz4),
            other => bail!(ErrorKind::UnsupportedCompression(other)),
        }
    }
}

/// `MessageSet => [Offset MessageSize Message]`
///
/// A sequence of messages with monotonically increasing offsets within one
/// partition. The server may truncate the last message to fit the client's
/// byte budget; `parse_message_set` discards that partial tail rather than
/// failing the whole decode.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MessageSet {
    pub messages: Vec<Message>,
}

/// `Message => Crc MagicByte Attributes [Timestamp] Key Value`
///
/// `Crc` covers everything after itself. Decoders verify it; a mismatch
/// raises `CorruptMessage` rather than silently returning bad bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub offset: Offset,
    pub timestamp: Option<MessageTimestamp>,
    pub compression: Compression,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MessageTimestamp {
    CreateTime(Timestamp),
    LogAppendTime(Timestamp),
}

impl MessageTimestamp {
    pub fn value(&self) -> Timestamp {
        match *self {
            MessageTimestamp::CreateTime(v) | MessageTimestamp::LogAppendTime(v) => v,
        }
    }
}

impl Default for MessageTimestamp {
    fn default() -> Self {
        let ts = time::now_utc().to_timespec();
        MessageTimestamp::CreateTime(ts.sec * 1_000_000 + Timestamp::from(ts.nsec) / 1000)
    }
}

pub struct MessageSetEncoder {
    api_version: ApiVersion,
}

impl MessageSetEncoder {
    pub fn new(api_version: ApiVersion) -> Self {
        MessageSetEncoder { api_version: api_version }
    }

    pub fn encode<T: ByteOrder>(&self, message_set: &MessageSet, buf: &mut BytesMut) -> Result<()> {
        buf.put_array::<T, _, _>(message_set.messages.iter(), |buf, message| {
            self.encode_message::<T>(message, buf)
        })
    }

    fn encode_message<T: ByteOrder>(&self, message: &Message, buf: &mut BytesMut) -> Result<()> {
        buf.put_i64::<T>(message.offset);

        let size_off = buf.len();
        buf.put_i32::<T>(0);
        let crc_off = buf.len();
        buf.put_i32::<T>(0);
        let data_off = buf.len();

        buf.put_i8(if self.api_version > 0 { 1 } else { 0 });
        buf.put_i8((message.compression as i8 & COMPRESSION_CODEC_MASK) |
                   if let Some(MessageTimestamp::LogAppendTime(_)) = message.timestamp {
                       TIMESTAMP_TYPE_MASK
                   } else {
                       0
                   });

        if self.api_version > 0 {
            buf.put_i64::<T>(message.timestamp.unwrap_or_default().value());
        }

        buf.put_bytes::<T, _>(message.key.as_ref());
        buf.put_bytes::<T, _>(message.value.as_ref());

        let size = (buf.len() - crc_off) as i32;
        let crc = crc32::checksum_ieee(&buf[data_off..]) as i32;

        T::write_i32(&mut buf[size_off..], size);
        T::write_i32(&mut buf[crc_off..], crc);

        Ok(())
    }
}

/// Parses as many whole messages as `buf` contains, silently dropping a
/// truncated trailing message instead of failing the decode. This is the
/// client-side half of the server's "may return a partial last message"
/// contract.
pub fn parse_message_set(buf: &[u8], api_version: ApiVersion) -> Result<MessageSet> {
    let mut messages = Vec::new();
    let mut remaining = buf;

    loop {
        if remaining.len() < mem::size_of::<Offset>() + mem::size_of::<i32>() {
            break;
        }

        match parse_message(remaining, api_version) {
            IResult::Done(rest, message) => {
                messages.push(message);
                remaining = rest;
            }
            // The declared message size runs past the end of the buffer:
            // the fetch byte budget truncated the trailing message. Stop
            // here and hand back what decoded cleanly, per the message-set
            // contract.
            IResult::Incomplete(_) => break,
            // The bytes we *did* have were a complete, well-formed frame
            // that failed its CRC or named an unsupported codec — this is
            // a data-integrity error, not truncation, and must surface to
            // the caller rather than be swallowed.
            IResult::Error(::nom::ErrorKind::Custom(1)) => {
                bail!(ErrorKind::KafkaError(KafkaCode::CorruptMessage))
            }
            IResult::Error(::nom::ErrorKind::Custom(2)) => {
                bail!(ErrorKind::UnsupportedCompression(0))
            }
            IResult::Error(_) => break,
        }
    }

    Ok(MessageSet { messages: messages })
}

fn parse_message(input: &[u8], api_version: ApiVersion) -> IResult<&[u8], Message> {
    do_parse!(input,
        offset: be_i64
     >> size: be_i32
     >> data: peek!(take!(size))
     >> crc: be_i32
     >> _magic: be_i8
     >> attrs: be_i8
     >> timestamp: cond!(api_version > 0, be_i64)
     >> key: parse_bytes
     >> value: parse_bytes
     >> ({
            let computed = crc32::checksum_ieee(&data[mem::size_of::<i32>()..]) as i32;
            if computed != crc {
                return IResult::Error(::nom::ErrorKind::Custom(1));
            }

            let compression = match Compression::from_attributes(attrs) {
                Ok(c) => c,
                Err(_) => return IResult::Error(::nom::ErrorKind::Custom(2)),
            };

            Message {
                offset: offset,
                timestamp: timestamp.map(|ts| if (attrs & TIMESTAMP_TYPE_MASK) == 0 {
                    MessageTimestamp::CreateTime(ts)
                } else {
                    MessageTimestamp::LogAppendTime(ts)
                }),
                compression: compression,
                key: key,
                value: value,
            }
        })
    )
}
