//! # RESP Encoding and Parsing
//!
//! Purpose: Encode client commands into request frames and parse server
//! replies from a partially filled read buffer.
//!
//! ## Design Principles
//! 1. **Incremental Parsing**: A reply is parsed only when the whole frame is
//!    buffered; otherwise nothing is consumed and `Ok(None)` asks for more bytes.
//! 2. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 3. **Errors Are Values**: `-ERR ...` replies become `RespValue::Error`; the
//!    engine decides what they mean.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.
//! 5. **Bounded Work**: `FrameScanner` resumes where the last read stopped, so
//!    a reply arriving in many reads is scanned once; nesting is capped at
//!    `MAX_DEPTH` so hostile replies cannot exhaust the stack.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use rkv_common::{Command, Endpoint};

use crate::error::{ClientError, ClientResult};

/// Largest bulk payload accepted from a server (512 MiB).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest aggregate nesting accepted from a server.
pub const MAX_DEPTH: usize = 512;

// Upper bound for speculative `Vec::with_capacity` on aggregate headers.
const MAX_PREALLOC: usize = 1024;

/// Wire-level reply value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK or +PONG style status replies.
    Simple(String),
    /// -ERR ... replies.
    Error(ErrorReply),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings.
    Bulk(Vec<u8>),
    /// Null bulk, null array or RESP3 null.
    Nil,
    /// *... arrays (and RESP3 sets).
    Array(Vec<RespValue>),
    /// RESP3 %... maps, kept in wire order.
    Map(Vec<(RespValue, RespValue)>),
}

impl RespValue {
    /// Short name of the reply shape, used in decode error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::Simple(_) => "status",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::Bulk(_) => "bulk",
            RespValue::Nil => "nil",
            RespValue::Array(_) => "array",
            RespValue::Map(_) => "map",
        }
    }
}

/// A server error reply split into its code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    /// Leading word, e.g. `ERR`, `WRONGTYPE`, `MOVED`.
    pub code: String,
    /// Everything after the code.
    pub message: String,
}

impl ErrorReply {
    /// Splits an error line (without the `-` prefix) into code and message.
    pub fn parse(line: &str) -> Self {
        match line.split_once(' ') {
            Some((code, message)) => ErrorReply {
                code: code.to_string(),
                message: message.to_string(),
            },
            None => ErrorReply {
                code: line.to_string(),
                message: String::new(),
            },
        }
    }

    /// Returns the cluster redirection this reply carries, if any.
    pub fn redirect(&self) -> Option<Redirect> {
        let mut parts = self.message.split_ascii_whitespace();
        let slot = parts.next()?.parse().ok()?;
        let endpoint = parts.next()?.parse().ok()?;
        match self.code.as_str() {
            "MOVED" => Some(Redirect::Moved { slot, endpoint }),
            "ASK" => Some(Redirect::Ask { slot, endpoint }),
            _ => None,
        }
    }

    /// True for cluster states that clear up on their own (resharding, failover).
    pub fn is_cluster_transient(&self) -> bool {
        matches!(self.code.as_str(), "TRYAGAIN" | "CLUSTERDOWN")
    }
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.code)
        } else {
            write!(f, "{} {}", self.code, self.message)
        }
    }
}

/// Cluster redirection signalled by a `MOVED` or `ASK` error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The slot has a new permanent owner.
    Moved { slot: u16, endpoint: Endpoint },
    /// The slot is migrating; retry once on `endpoint` after `ASKING`.
    Ask { slot: u16, endpoint: Endpoint },
}

impl Redirect {
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Redirect::Moved { endpoint, .. } | Redirect::Ask { endpoint, .. } => endpoint,
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Redirect::Moved { slot, endpoint } => write!(f, "MOVED {} {}", slot, endpoint),
            Redirect::Ask { slot, endpoint } => write!(f, "ASK {} {}", slot, endpoint),
        }
    }
}

/// Encodes a command as a RESP array of bulk strings into `out`.
pub fn encode_command(command: &Command, out: &mut BytesMut) {
    out.put_u8(b'*');
    push_usize(out, command.len());
    out.put_slice(b"\r\n");
    for arg in command.args() {
        let data = arg.to_bytes();
        out.reserve(data.len() + 16);
        out.put_u8(b'$');
        push_usize(out, data.len());
        out.put_slice(b"\r\n");
        out.put_slice(&data);
        out.put_slice(b"\r\n");
    }
}

/// Parses one reply frame from the front of `buf`.
///
/// Returns `Ok(None)` without consuming anything when the frame is incomplete.
pub fn parse_reply(buf: &mut BytesMut) -> ClientResult<Option<RespValue>> {
    let mut pos = 0;
    match parse_value(&buf[..], &mut pos, 0)? {
        Some(value) => {
            buf.advance(pos);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Tracks how far into a partially buffered reply the framing is known to be
/// valid, so each read only scans the newly arrived bytes.
#[derive(Debug, Default)]
pub struct FrameScanner {
    pos: usize,
    // Children still expected by each open aggregate, innermost last.
    open: Vec<usize>,
}

impl FrameScanner {
    /// Returns the length of the first complete frame in `buf`, or `None`
    /// when more bytes are needed.
    ///
    /// `buf` must only grow at the end between calls.
    pub fn scan(&mut self, buf: &[u8]) -> ClientResult<Option<usize>> {
        loop {
            let mut pos = self.pos;
            let Some(line) = read_line(buf, &mut pos)? else {
                return Ok(None);
            };
            let (&prefix, body) = line
                .split_first()
                .ok_or_else(|| ClientError::Protocol("empty line".to_string()))?;

            let children = match prefix {
                b'+' | b'-' | b'_' | b',' => 0,
                b':' => {
                    parse_i64(body)?;
                    0
                }
                b'#' => match body {
                    b"t" | b"f" => 0,
                    _ => return Err(ClientError::Protocol("invalid boolean".to_string())),
                },
                b'$' => {
                    let len = parse_i64(body)?;
                    if len > MAX_BULK_LEN {
                        return Err(ClientError::Protocol(format!("bulk length {} too large", len)));
                    }
                    if len >= 0 {
                        let end = pos + len as usize;
                        if buf.len() < end + 2 {
                            return Ok(None);
                        }
                        if &buf[end..end + 2] != b"\r\n" {
                            return Err(ClientError::Protocol("bulk string missing CRLF".to_string()));
                        }
                        pos = end + 2;
                    }
                    0
                }
                b'*' | b'~' | b'%' => {
                    if self.open.len() >= MAX_DEPTH {
                        return Err(nesting_too_deep());
                    }
                    let len = parse_i64(body)?.max(0) as usize;
                    if prefix == b'%' {
                        len.checked_mul(2)
                            .ok_or_else(|| ClientError::Protocol("map too large".to_string()))?
                    } else {
                        len
                    }
                }
                other => {
                    return Err(ClientError::Protocol(format!(
                        "unknown reply type byte 0x{:02x}",
                        other
                    )))
                }
            };
            self.pos = pos;

            if children > 0 {
                self.open.push(children);
                continue;
            }
            // A value finished; close every aggregate it completes.
            loop {
                match self.open.last_mut() {
                    None => {
                        let len = self.pos;
                        self.reset();
                        return Ok(Some(len));
                    }
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.open.pop();
                    }
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.pos = 0;
        self.open.clear();
    }
}

/// Like `parse_reply`, but scans incrementally with `scanner` and builds the
/// value only once the whole frame is buffered.
pub fn take_reply(buf: &mut BytesMut, scanner: &mut FrameScanner) -> ClientResult<Option<RespValue>> {
    let Some(len) = scanner.scan(&buf[..])? else {
        return Ok(None);
    };
    let mut pos = 0;
    match parse_value(&buf[..len], &mut pos, 0)? {
        Some(value) => {
            buf.advance(len);
            Ok(Some(value))
        }
        None => Err(ClientError::Protocol("frame ended early".to_string())),
    }
}

fn nesting_too_deep() -> ClientError {
    ClientError::Protocol("nesting too deep".to_string())
}

// `depth` counts the aggregates enclosing the value at `pos`.
fn parse_value(buf: &[u8], pos: &mut usize, depth: usize) -> ClientResult<Option<RespValue>> {
    let line = match read_line(buf, pos)? {
        Some(line) => line,
        None => return Ok(None),
    };
    let (&prefix, body) = line
        .split_first()
        .ok_or_else(|| ClientError::Protocol("empty line".to_string()))?;
    if matches!(prefix, b'*' | b'~' | b'%') && depth >= MAX_DEPTH {
        return Err(nesting_too_deep());
    }

    let value = match prefix {
        b'+' => RespValue::Simple(String::from_utf8_lossy(body).into_owned()),
        b'-' => RespValue::Error(ErrorReply::parse(&String::from_utf8_lossy(body))),
        b':' => RespValue::Integer(parse_i64(body)?),
        b'$' => return parse_bulk(buf, pos, parse_i64(body)?),
        b'*' | b'~' => return parse_array(buf, pos, parse_i64(body)?, depth),
        b'%' => return parse_map(buf, pos, parse_i64(body)?, depth),
        b'_' => RespValue::Nil,
        b'#' => match body {
            b"t" => RespValue::Integer(1),
            b"f" => RespValue::Integer(0),
            _ => return Err(ClientError::Protocol("invalid boolean".to_string())),
        },
        b',' => RespValue::Bulk(body.to_vec()),
        other => {
            return Err(ClientError::Protocol(format!(
                "unknown reply type byte 0x{:02x}",
                other
            )))
        }
    };
    Ok(Some(value))
}

fn parse_bulk(buf: &[u8], pos: &mut usize, len: i64) -> ClientResult<Option<RespValue>> {
    if len < 0 {
        return Ok(Some(RespValue::Nil));
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol(format!("bulk length {} too large", len)));
    }
    let len = len as usize;
    let end = *pos + len;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(ClientError::Protocol("bulk string missing CRLF".to_string()));
    }
    let data = buf[*pos..end].to_vec();
    *pos = end + 2;
    Ok(Some(RespValue::Bulk(data)))
}

fn parse_array(buf: &[u8], pos: &mut usize, len: i64, depth: usize) -> ClientResult<Option<RespValue>> {
    if len < 0 {
        return Ok(Some(RespValue::Nil));
    }
    let len = len as usize;
    let mut items = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        match parse_value(buf, pos, depth + 1)? {
            Some(item) => items.push(item),
            None => return Ok(None),
        }
    }
    Ok(Some(RespValue::Array(items)))
}

fn parse_map(buf: &[u8], pos: &mut usize, len: i64, depth: usize) -> ClientResult<Option<RespValue>> {
    if len < 0 {
        return Ok(Some(RespValue::Nil));
    }
    let len = len as usize;
    let mut entries = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        let key = match parse_value(buf, pos, depth + 1)? {
            Some(key) => key,
            None => return Ok(None),
        };
        let value = match parse_value(buf, pos, depth + 1)? {
            Some(value) => value,
            None => return Ok(None),
        };
        entries.push((key, value));
    }
    Ok(Some(RespValue::Map(entries)))
}

/// Returns the next CRLF-terminated line (without the CRLF) and moves `pos`
/// past it, or `None` when no complete line is buffered.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> ClientResult<Option<&'a [u8]>> {
    let start = *pos;
    let Some(offset) = buf.get(start..).and_then(|rest| rest.iter().position(|&b| b == b'\n')) else {
        return Ok(None);
    };
    let newline = start + offset;
    if newline == start || buf[newline - 1] != b'\r' {
        return Err(ClientError::Protocol("line not terminated by CRLF".to_string()));
    }
    *pos = newline + 1;
    Ok(Some(&buf[start..newline - 1]))
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    let invalid = || ClientError::Protocol(format!("invalid integer {:?}", String::from_utf8_lossy(data)));
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        Some(_) => (false, data),
        None => return Err(invalid()),
    };
    if digits.is_empty() {
        return Err(invalid());
    }

    // Negative values accumulate downwards so i64::MIN stays representable.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(invalid());
        }
        let digit = (b - b'0') as i64;
        value = value
            .checked_mul(10)
            .and_then(|v| {
                if negative {
                    v.checked_sub(digit)
                } else {
                    v.checked_add(digit)
                }
            })
            .ok_or_else(invalid)?;
    }

    Ok(value)
}

fn push_usize(out: &mut BytesMut, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.put_slice(&buf[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkv_common::Arg;

    fn parse_all(data: &[u8]) -> RespValue {
        let mut buf = BytesMut::from(data);
        let value = parse_reply(&mut buf).unwrap().expect("complete frame");
        assert!(buf.is_empty(), "frame should be fully consumed");
        value
    }

    #[test]
    fn encodes_command() {
        let mut buf = BytesMut::new();
        encode_command(&Command::new("get").arg("key"), &mut buf);
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }

    #[test]
    fn encodes_numeric_and_binary_args() {
        let mut buf = BytesMut::new();
        let cmd = Command::new("SET").arg(b"k\r\n").arg(12i64).arg(0.5f64);
        encode_command(&cmd, &mut buf);
        assert_eq!(
            &buf[..],
            b"*4\r\n$3\r\nSET\r\n$3\r\nk\r\n\r\n$2\r\n12\r\n$3\r\n0.5\r\n"
        );
    }

    #[test]
    fn request_frame_parses_back_to_its_arguments() {
        let cmd = Command::from_args(vec![
            Arg::from("HSET"),
            Arg::from(vec![0u8, 255, 13, 10]),
            Arg::from(-7i64),
            Arg::from(2.25f64),
            Arg::from(""),
        ]);
        let mut buf = BytesMut::new();
        encode_command(&cmd, &mut buf);

        let expected: Vec<RespValue> = cmd
            .args()
            .iter()
            .map(|arg| RespValue::Bulk(arg.to_bytes().into_owned()))
            .collect();
        assert_eq!(parse_all(&buf), RespValue::Array(expected));
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse_all(b"+OK\r\n"), RespValue::Simple("OK".to_string()));
        assert_eq!(parse_all(b":42\r\n"), RespValue::Integer(42));
        assert_eq!(parse_all(b":-3\r\n"), RespValue::Integer(-3));
        assert_eq!(parse_all(b"$5\r\nhello\r\n"), RespValue::Bulk(b"hello".to_vec()));
        assert_eq!(parse_all(b"$0\r\n\r\n"), RespValue::Bulk(Vec::new()));
        assert_eq!(parse_all(b"$-1\r\n"), RespValue::Nil);
        assert_eq!(parse_all(b"*-1\r\n"), RespValue::Nil);
    }

    #[test]
    fn parses_error_reply_as_value() {
        match parse_all(b"-WRONGTYPE Operation against a key\r\n") {
            RespValue::Error(reply) => {
                assert_eq!(reply.code, "WRONGTYPE");
                assert_eq!(reply.message, "Operation against a key");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn parses_nested_aggregates() {
        let value = parse_all(b"*2\r\n*2\r\n:1\r\n$1\r\na\r\n%1\r\n+k\r\n_\r\n");
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Array(vec![RespValue::Integer(1), RespValue::Bulk(b"a".to_vec())]),
                RespValue::Map(vec![(RespValue::Simple("k".to_string()), RespValue::Nil)]),
            ])
        );
    }

    #[test]
    fn parses_resp3_scalars() {
        assert_eq!(parse_all(b"#t\r\n"), RespValue::Integer(1));
        assert_eq!(parse_all(b",3.5\r\n"), RespValue::Bulk(b"3.5".to_vec()));
        assert_eq!(
            parse_all(b"~1\r\n:9\r\n"),
            RespValue::Array(vec![RespValue::Integer(9)])
        );
    }

    #[test]
    fn partial_frame_consumes_nothing() {
        let full = b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        for cut in 0..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            assert_eq!(parse_reply(&mut buf).unwrap(), None, "cut at {}", cut);
            assert_eq!(buf.len(), cut);
        }
    }

    #[test]
    fn consumes_exactly_one_frame() {
        let mut buf = BytesMut::from(&b"+OK\r\n:7\r\n$2\r\nh"[..]);
        assert_eq!(
            parse_reply(&mut buf).unwrap(),
            Some(RespValue::Simple("OK".to_string()))
        );
        assert_eq!(parse_reply(&mut buf).unwrap(), Some(RespValue::Integer(7)));
        assert_eq!(parse_reply(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"$2\r\nh");
        buf.extend_from_slice(b"i\r\n");
        assert_eq!(
            parse_reply(&mut buf).unwrap(),
            Some(RespValue::Bulk(b"hi".to_vec()))
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        for data in [&b"?x\r\n"[..], b":12a\r\n", b"$3\r\nabcd\r\n", b"+OK\n", b"#x\r\n"] {
            let mut buf = BytesMut::from(data);
            assert!(
                matches!(parse_reply(&mut buf), Err(ClientError::Protocol(_))),
                "{:?}",
                data
            );
        }
    }

    #[test]
    fn rejects_nesting_past_max_depth() {
        let mut deep = b"*1\r\n".repeat(200_000);
        deep.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&deep[..]);
        assert!(matches!(parse_reply(&mut buf), Err(ClientError::Protocol(_))));
        let mut scanner = FrameScanner::default();
        assert!(matches!(
            take_reply(&mut buf, &mut scanner),
            Err(ClientError::Protocol(_))
        ));

        let mut nested = b"*1\r\n".repeat(MAX_DEPTH);
        nested.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&nested[..]);
        assert!(parse_reply(&mut buf).unwrap().is_some());
        let mut buf = BytesMut::from(&nested[..]);
        assert!(take_reply(&mut buf, &mut FrameScanner::default()).unwrap().is_some());

        let mut too_deep = b"*1\r\n".repeat(MAX_DEPTH + 1);
        too_deep.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&too_deep[..]);
        assert!(matches!(parse_reply(&mut buf), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn parses_integer_extremes() {
        assert_eq!(parse_all(b":-9223372036854775808\r\n"), RespValue::Integer(i64::MIN));
        assert_eq!(parse_all(b":9223372036854775807\r\n"), RespValue::Integer(i64::MAX));
        let mut buf = BytesMut::from(&b":9223372036854775808\r\n"[..]);
        assert!(parse_reply(&mut buf).is_err());
        let mut buf = BytesMut::from(&b":-9223372036854775809\r\n"[..]);
        assert!(parse_reply(&mut buf).is_err());
    }

    #[test]
    fn scanner_resumes_across_chunks() {
        let mut frame = b"*3\r\n$5\r\nhello\r\n%1\r\n+k\r\n:7\r\n*0\r\n".to_vec();
        let expected = parse_all(&frame);
        frame.extend_from_slice(b"+NEXT\r\n");

        let mut scanner = FrameScanner::default();
        let mut buf = BytesMut::new();
        let mut reply = None;
        for byte in &frame {
            buf.extend_from_slice(&[*byte]);
            if let Some(value) = take_reply(&mut buf, &mut scanner).unwrap() {
                reply = Some(value);
                break;
            }
        }
        assert_eq!(reply, Some(expected));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"+NEXT\r\n");
        assert_eq!(
            take_reply(&mut buf, &mut scanner).unwrap(),
            Some(RespValue::Simple("NEXT".to_string()))
        );
    }

    #[test]
    fn scanner_progress_is_not_rescanned() {
        let count = 1000;
        let mut frame = format!("*{}\r\n", count).into_bytes();
        for idx in 0..count {
            frame.extend_from_slice(format!(":{}\r\n", idx).as_bytes());
        }

        let mut scanner = FrameScanner::default();
        let mut buf = BytesMut::new();
        let half = frame.len() / 2;
        buf.extend_from_slice(&frame[..half]);
        assert_eq!(take_reply(&mut buf, &mut scanner).unwrap(), None);
        assert!(scanner.pos > 0 && scanner.pos <= half);
        let resumed_at = scanner.pos;

        buf.extend_from_slice(&frame[half..]);
        let value = take_reply(&mut buf, &mut scanner).unwrap().unwrap();
        assert!(resumed_at > frame.len() / 4);
        match value {
            RespValue::Array(items) => assert_eq!(items.len(), count),
            other => panic!("expected array, got {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn scanner_rejects_what_parser_rejects() {
        for data in [&b"?x\r\n"[..], b":12a\r\n", b"$3\r\nabcd\r\n", b"+OK\n", b"#x\r\n"] {
            let mut buf = BytesMut::from(data);
            let mut scanner = FrameScanner::default();
            assert!(
                matches!(take_reply(&mut buf, &mut scanner), Err(ClientError::Protocol(_))),
                "{:?}",
                data
            );
        }
    }

    #[test]
    fn parses_redirects() {
        let moved = ErrorReply::parse("MOVED 3999 127.0.0.1:6381");
        assert_eq!(
            moved.redirect(),
            Some(Redirect::Moved {
                slot: 3999,
                endpoint: Endpoint::new("127.0.0.1", 6381),
            })
        );
        let ask = ErrorReply::parse("ASK 12 10.0.0.2:7002");
        assert_eq!(
            ask.redirect(),
            Some(Redirect::Ask {
                slot: 12,
                endpoint: Endpoint::new("10.0.0.2", 7002),
            })
        );
        assert_eq!(ErrorReply::parse("ERR bad").redirect(), None);
        assert!(ErrorReply::parse("TRYAGAIN Multiple keys request during rehashing").is_cluster_transient());
    }
}
