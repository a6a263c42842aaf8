//! Incremental RESP Parser
//!
//! The parser works on a byte slice holding whatever has been read from a
//! socket so far and returns one of:
//! - `Ok(Some((value, consumed)))`: a complete value, `consumed` bytes used
//! - `Ok(None)`: the value is incomplete, read more and retry
//! - `Err(ParseError)`: the stream is not valid RESP
//!
//! It is used on both sides of the proxy: for client requests (arrays of bulk
//! strings, or inline commands typed into telnet) and for upstream replies.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid integer in an integer reply or a length header
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error or header
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Negative bulk length other than -1
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Negative array length other than -1
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Structural violation (missing CRLF, nesting too deep, empty inline command)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A bulk string longer than [`MAX_BULK_SIZE`]
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

type Parsed = ParseResult<Option<(RespValue, usize)>>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// A resumable RESP parser.
///
/// The parser keeps no buffer of its own. Callers append socket reads to a
/// `BytesMut`, call [`RespParser::parse`], and split off `consumed` bytes on
/// success.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one complete value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> Parsed {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> Parsed {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(read_text(buf)?
                .map(|(s, used)| (RespValue::SimpleString(s.to_string()), used))),
            prefix::ERROR => {
                Ok(read_text(buf)?.map(|(s, used)| (RespValue::Error(s.to_string()), used)))
            }
            prefix::INTEGER => Ok(read_number(buf)?.map(|(n, used)| (RespValue::Integer(n), used))),
            prefix::BULK_STRING => parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            _ => parse_inline(buf),
        }
    }

    /// `*<count>\r\n<element>...`
    fn parse_array(&mut self, buf: &[u8]) -> Parsed {
        let (count, mut consumed) = match read_number(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        // The count is untrusted; cap the pre-allocation.
        let mut elements = Vec::with_capacity((count as usize).min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> Parsed {
    let (length, data_start) = match read_number(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length == -1 {
        return Ok(Some((RespValue::Null, data_start)));
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let data_end = data_start + length;
    if buf.len() < data_end + 2 {
        return Ok(None);
    }
    if &buf[data_end..data_end + 2] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
    Ok(Some((RespValue::BulkString(data), data_end + 2)))
}

/// A whitespace-separated command line, as typed into telnet.
fn parse_inline(buf: &[u8]) -> Parsed {
    let end = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let line =
        std::str::from_utf8(&buf[..end]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

    let words: Vec<RespValue> = line
        .split_whitespace()
        .map(|w| RespValue::BulkString(Bytes::copy_from_slice(w.as_bytes())))
        .collect();

    if words.is_empty() {
        return Err(ParseError::ProtocolError(
            "empty inline command".to_string(),
        ));
    }

    Ok(Some((RespValue::Array(words), end + 2)))
}

/// Reads the line after the type prefix as UTF-8.
fn read_text(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let text = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((text, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Reads the line after the type prefix as a signed integer.
fn read_number(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match read_text(buf)? {
        Some((text, used)) => {
            let n = text
                .parse::<i64>()
                .map_err(|e| ParseError::InvalidInteger(format!("{:?}: {}", text, e)))?;
            Ok(Some((n, used)))
        }
        None => Ok(None),
    }
}

/// Position of the first `\r\n` in `buf`, if any.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP message with a fresh parser.
pub fn parse_message(buf: &[u8]) -> Parsed {
    RespParser::new().parse(buf)
}
