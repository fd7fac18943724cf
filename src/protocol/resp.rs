//! RESP Codec
//!
//! RESP2 subset for Redis client compatibility: inbound requests are arrays
//! of bulk strings, replies use simple strings, bulk strings, integers,
//! arrays and errors. Implements the tokio-util codec traits so the
//! front-end can drain pipelined requests from one buffer.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on elements in one request array.
const MAX_ARRAY_LEN: usize = 1024;

/// Upper bound on one bulk string payload.
const MAX_BULK_LEN: usize = 16 * 1024 * 1024;

/// Decoded request: the command name and its arguments, as sent.
pub type RespArgs = Vec<Bytes>;

/// Reply shapes the RESP front-end can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum RespReply {
    /// `+OK\r\n`
    Simple(&'static str),
    /// `$L\r\n…\r\n`
    Bulk(Bytes),
    /// `$-1\r\n`
    NullBulk,
    /// `:N\r\n`
    Integer(i64),
    /// `*N\r\n` of bulk strings
    Array(Vec<Bytes>),
    /// `-ERR …\r\n` (the message carries its own `ERR ` prefix)
    Error(String),
}

#[derive(Debug, Default)]
pub struct RespCodec;

impl RespCodec {
    pub fn new() -> Self {
        Self
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Index of the `\r` of the next CRLF at or after `from`, if complete.
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn parse_len(digits: &[u8], max: usize, what: &str) -> io::Result<usize> {
    let s = std::str::from_utf8(digits).map_err(|_| invalid(format!("bad {what} length")))?;
    let n: usize = s
        .parse()
        .map_err(|_| invalid(format!("bad {what} length")))?;
    if n > max {
        return Err(invalid(format!("{what} length {n} exceeds limit")));
    }
    Ok(n)
}

/// Parse one complete `*N` array of `$L` bulk strings from the front of
/// `buf`. Returns the arguments and the number of bytes they occupied, or
/// `None` when the buffer does not yet hold a complete request.
fn parse_array(buf: &[u8]) -> io::Result<Option<(RespArgs, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf[0] != b'*' {
        return Err(invalid(format!(
            "expected array, got 0x{:02x}",
            buf[0]
        )));
    }

    let header_end = match find_crlf(buf, 1) {
        Some(i) => i,
        None => return Ok(None),
    };
    let count = parse_len(&buf[1..header_end], MAX_ARRAY_LEN, "array")?;

    let mut pos = header_end + 2;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if pos >= buf.len() {
            return Ok(None);
        }
        if buf[pos] != b'$' {
            return Err(invalid(format!(
                "expected bulk string, got 0x{:02x}",
                buf[pos]
            )));
        }

        let len_end = match find_crlf(buf, pos + 1) {
            Some(i) => i,
            None => return Ok(None),
        };
        let len = parse_len(&buf[pos + 1..len_end], MAX_BULK_LEN, "bulk")?;

        let data_start = len_end + 2;
        let data_end = data_start + len;
        if buf.len() < data_end + 2 {
            return Ok(None);
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Err(invalid("bulk string missing terminator"));
        }

        args.push(Bytes::copy_from_slice(&buf[data_start..data_end]));
        pos = data_end + 2;
    }

    Ok(Some((args, pos)))
}

impl Decoder for RespCodec {
    type Item = RespArgs;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<RespArgs>> {
        match parse_array(src)? {
            Some((args, consumed)) => {
                src.advance(consumed);
                Ok(Some(args))
            }
            None => Ok(None),
        }
    }
}

fn put_bulk(dst: &mut BytesMut, data: &[u8]) {
    dst.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    dst.extend_from_slice(data);
    dst.extend_from_slice(b"\r\n");
}

impl Encoder<RespReply> for RespCodec {
    type Error = io::Error;

    fn encode(&mut self, reply: RespReply, dst: &mut BytesMut) -> io::Result<()> {
        match reply {
            RespReply::Simple(s) => {
                dst.extend_from_slice(format!("+{s}\r\n").as_bytes());
            }
            RespReply::Bulk(data) => put_bulk(dst, &data),
            RespReply::NullBulk => dst.extend_from_slice(b"$-1\r\n"),
            RespReply::Integer(n) => {
                dst.extend_from_slice(format!(":{n}\r\n").as_bytes());
            }
            RespReply::Array(items) => {
                dst.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    put_bulk(dst, &item);
                }
            }
            RespReply::Error(msg) => {
                dst.extend_from_slice(format!("-{msg}\r\n").as_bytes());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> (Vec<RespArgs>, BytesMut) {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(args) = codec.decode(&mut buf).unwrap() {
            out.push(args);
        }
        (out, buf)
    }

    #[test]
    fn test_decode_single_command() {
        let (decoded, rest) = decode_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
        assert_eq!(decoded.len(), 1);
        assert_eq!(
            decoded[0],
            vec![
                Bytes::from_static(b"SET"),
                Bytes::from_static(b"k"),
                Bytes::from_static(b"v")
            ]
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decode_pipelined_commands() {
        let (decoded, rest) =
            decode_all(b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n");
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0][1], Bytes::from_static(b"a"));
        assert_eq!(decoded[1][1], Bytes::from_static(b"b"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decode_partial_leaves_buffer() {
        let full = b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n";
        for cut in 1..full.len() {
            let mut codec = RespCodec::new();
            let mut buf = BytesMut::from(&full[..cut]);
            assert!(codec.decode(&mut buf).unwrap().is_none(), "cut at {cut}");
            // Nothing consumed until the request completes.
            assert_eq!(&buf[..], &full[..cut]);
        }
    }

    #[test]
    fn test_decode_resumes_after_partial() {
        let mut codec = RespCodec::new();
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPI"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"NG\r\n");
        let args = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![Bytes::from_static(b"PING")]);
    }

    #[test]
    fn test_decode_malformed_errors() {
        let mut codec = RespCodec::new();

        let mut buf = BytesMut::from(&b"PING\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*1\r\n:5\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*x\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());

        // Bulk payload longer than its declared length.
        let mut buf = BytesMut::from(&b"*1\r\n$2\r\nabc\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_replies() {
        let cases: Vec<(RespReply, &[u8])> = vec![
            (RespReply::Simple("OK"), b"+OK\r\n"),
            (RespReply::Bulk(Bytes::from_static(b"v")), b"$1\r\nv\r\n"),
            (RespReply::NullBulk, b"$-1\r\n"),
            (RespReply::Integer(42), b":42\r\n"),
            (
                RespReply::Array(vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")]),
                b"*2\r\n$1\r\nx\r\n$1\r\ny\r\n",
            ),
            (
                RespReply::Error("ERR unknown command 'WAT'".to_string()),
                b"-ERR unknown command 'WAT'\r\n",
            ),
        ];

        for (reply, expected) in cases {
            let mut codec = RespCodec::new();
            let mut dst = BytesMut::new();
            codec.encode(reply, &mut dst).unwrap();
            assert_eq!(&dst[..], expected);
        }
    }

    #[test]
    fn test_empty_array_decodes() {
        let (decoded, _) = decode_all(b"*0\r\n");
        assert_eq!(decoded, vec![Vec::<Bytes>::new()]);
    }
}
