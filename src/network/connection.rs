//! One TCP session to one broker.
//!
//! A `Connection` frames requests with the `size:i32 | api_key:i16 |
//! api_version:i16 | correlation_id:i32 | client_id:string | body` envelope
//! and matches responses back to requests by correlation id. It is not
//! concurrent-safe: the `BrokerPool` hands out at most one `Connection` per
//! broker and serialises calls to it (see `network::pool`).

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use bytes::{BigEndian, BufMut, ByteOrder, Bytes, BytesMut};

use errors::{Error, ErrorKind, Result};
use protocol::CorrelationId;

/// A TCP connection to a single broker, lazily dialed on first use.
pub struct Connection {
    addr: SocketAddr,
    client_id: Option<String>,
    connect_timeout: Duration,
    socket_timeout: Duration,
    correlation_id: CorrelationId,
    stream: Option<TcpStream>,
}

impl Connection {
    pub fn new(addr: SocketAddr,
               client_id: Option<String>,
               connect_timeout: Duration,
               socket_timeout: Duration)
               -> Connection {
        Connection {
            addr: addr,
            client_id: client_id,
            connect_timeout: connect_timeout,
            socket_timeout: socket_timeout,
            correlation_id: 0,
            stream: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn next_correlation_id(&mut self) -> CorrelationId {
        let id = self.correlation_id;
        self.correlation_id = self.correlation_id.wrapping_add(1);
        id
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        debug!("dialing broker at {}", self.addr);

        let stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)
            .map_err(|_| Error::from(ErrorKind::ConnectionError(self.addr)))?;
        stream.set_read_timeout(Some(self.socket_timeout))?;
        stream.set_write_timeout(Some(self.socket_timeout))?;
        stream.set_nodelay(true)?;

        self.stream = Some(stream);
        Ok(())
    }

    /// Send one request and, unless `decode` is `None`, block for the
    /// matching response.
    ///
    /// Each protocol request type (`protocol::MetadataRequest` and so on)
    /// already encodes its own `RequestHeader`, envelope fields included;
    /// `encode` is handed the connection-assigned correlation id so it can
    /// fill that header in and return the fully encoded request body
    /// (header + body, everything after the leading `size:i32`).
    ///
    /// `decode = None` is the fire-and-forget case: the call
    /// returns as soon as the bytes are written, and a later call on this
    /// connection is responsible for skipping past whatever response the
    /// broker eventually sends for this correlation id.
    pub fn request<E, D, R>(&mut self, encode: E, decode: Option<D>) -> Result<Option<R>>
        where E: FnOnce(CorrelationId) -> Result<BytesMut>,
              D: FnOnce(&[u8]) -> Result<R>
    {
        match self.try_request(encode, decode) {
            Ok(response) => Ok(response),
            Err(err) => {
                // Any I/O failure closes the socket; the next call re-dials,
                // per the connection's error-handling contract.
                self.stream = None;
                Err(err)
            }
        }
    }

    fn try_request<E, D, R>(&mut self, encode: E, decode: Option<D>) -> Result<Option<R>>
        where E: FnOnce(CorrelationId) -> Result<BytesMut>,
              D: FnOnce(&[u8]) -> Result<R>
    {
        self.ensure_connected()?;

        let correlation_id = self.next_correlation_id();
        let body = encode(correlation_id)?;
        let mut frame = BytesMut::with_capacity(body.len() + 4);
        frame.put_i32::<BigEndian>(body.len() as i32);
        frame.extend_from_slice(&body);

        {
            let stream = self.stream.as_mut().expect("checked by ensure_connected");
            stream.write_all(&frame)?;
        }

        match decode {
            None => Ok(None),
            Some(decode) => {
                let stream = self.stream.as_mut().expect("checked by ensure_connected");
                let body = read_matching_response(stream, correlation_id)?;
                Ok(Some(decode(&body)?))
            }
        }
    }
}

/// Reads frames off `stream` in order, discarding any whose correlation id
/// does not match `expected` — the stale-response-skip half of the
/// request contract — until the matching one arrives.
pub fn read_matching_response<S: Read>(stream: &mut S, expected: CorrelationId) -> Result<Bytes> {
    loop {
        let body = read_one_frame(stream)?;
        if body.len() < 4 {
            bail!(ErrorKind::UnexpectedEOF(4, body.len()));
        }
        let correlation_id = BigEndian::read_i32(&body[..4]);
        if correlation_id == expected {
            return Ok(body);
        }
        debug!("discarding stale response with correlation id {}, waiting for {}",
               correlation_id,
               expected);
    }
}

fn read_one_frame<S: Read>(stream: &mut S) -> Result<Bytes> {
    let mut size_buf = [0u8; 4];
    read_exact_tracking(stream, &mut size_buf)?;
    let size = BigEndian::read_i32(&size_buf);
    if size < 0 {
        bail!(ErrorKind::UnexpectedEOF(0, 0));
    }

    let mut body = vec![0u8; size as usize];
    read_exact_tracking(stream, &mut body)?;
    Ok(Bytes::from(body))
}

/// Like `Read::read_exact`, but translates a short read into
/// `ErrorKind::UnexpectedEOF(expected, got)` instead of a bare `io::Error`,
/// so callers can tell "the frame was shorter than promised" apart from an
/// ordinary transport failure.
fn read_exact_tracking<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    let mut total = 0;
    while total < buf.len() {
        match stream.read(&mut buf[total..]) {
            Ok(0) => bail!(ErrorKind::UnexpectedEOF(buf.len(), total)),
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BigEndian, BufMut, BytesMut};

    use super::*;

    fn frame(correlation_id: i32, payload: &[u8]) -> Vec<u8> {
        let mut body = BytesMut::with_capacity(4 + payload.len());
        body.put_i32::<BigEndian>(correlation_id);
        body.extend_from_slice(payload);

        let mut out = BytesMut::with_capacity(4 + body.len());
        out.put_i32::<BigEndian>(body.len() as i32);
        out.extend_from_slice(&body);
        out.to_vec()
    }

    #[test]
    fn test_read_matching_response_skips_stale_frames() {
        let mut wire = Vec::new();
        wire.extend(frame(1, b"stale"));
        wire.extend(frame(2, b"fresh"));

        let mut cursor = Cursor::new(wire);
        let body = read_matching_response(&mut cursor, 2).unwrap();
        assert_eq!(&body[4..], b"fresh");
    }

    #[test]
    fn test_read_matching_response_returns_first_match_in_order() {
        let mut wire = Vec::new();
        wire.extend(frame(5, b"a"));

        let mut cursor = Cursor::new(wire);
        let body = read_matching_response(&mut cursor, 5).unwrap();
        assert_eq!(&body[4..], b"a");
    }

    #[test]
    fn test_short_read_raises_unexpected_eof() {
        // announces an 8-byte body but only delivers 4
        let mut wire = Vec::new();
        wire.put_i32::<BigEndian>(8);
        wire.put_i32::<BigEndian>(42);

        let mut cursor = Cursor::new(wire);
        let err = read_matching_response(&mut cursor, 42).unwrap_err();
        assert!(err.to_string().contains("unexpected EOF"));
    }
}
