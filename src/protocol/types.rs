//! RESP (Redis Serialization Protocol) Data Types
//!
//! Every value exchanged with clients and with the upstream host is a
//! [`RespValue`]. The same type is used in both directions: requests are
//! arrays of bulk strings, replies can be any variant.
//!
//! ## Wire Format
//!
//! - `+` Simple String: `+PASS\r\n`
//! - `-` Error: `-ERR wrong number of arguments for 'k.del' command\r\n`
//! - `:` Integer: `:3\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (null: `$-1\r\n`)
//! - `*` Array: `*2\r\n$4\r\nKEYS\r\n$1\r\n*\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe status line, e.g. `OK` or `PASS`.
    SimpleString(String),

    /// Error line. By convention the first word is the error code (`ERR`, `WRONGTYPE`).
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string.
    BulkString(Bytes),

    /// Null bulk string or null array.
    Null,

    /// Array of nested values.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Builds a request frame: an array of bulk strings, one per word.
    ///
    /// # Example
    /// ```
    /// use kbulk::protocol::RespValue;
    /// use bytes::Bytes;
    ///
    /// let frame = RespValue::command([Bytes::from("KEYS"), Bytes::from("user:*")]);
    /// assert_eq!(frame.serialize(), b"*2\r\n$4\r\nKEYS\r\n$6\r\nuser:*\r\n");
    /// ```
    pub fn command<I>(words: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        RespValue::Array(
            words
                .into_iter()
                .map(|w| RespValue::BulkString(w.into()))
                .collect(),
        )
    }

    /// Serializes the value to its wire representation.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_status(buf, prefix::SIMPLE_STRING, s),
            RespValue::Error(s) => write_status(buf, prefix::ERROR, s),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the payload of a simple or bulk string as bytes.
    ///
    /// Request words may arrive as either kind (inline commands produce bulk
    /// strings, some clients send simple strings), so both are accepted.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

/// Writes a `+` or `-` line. CR and LF in the text become spaces so the
/// line stays one frame.
fn write_status(buf: &mut Vec<u8>, prefix: u8, text: &str) {
    buf.push(prefix);
    buf.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    buf.extend_from_slice(CRLF);
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_serialize() {
        assert_eq!(RespValue::simple_string("PASS").serialize(), b"+PASS\r\n");
        assert_eq!(
            RespValue::error("ERR host call failed").serialize(),
            b"-ERR host call failed\r\n"
        );
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_line_breaks_in_status_text_stay_one_frame() {
        let reply = RespValue::error("ERR unknown command 'X\r\n+OK'");
        let wire = reply.serialize();
        assert_eq!(wire, b"-ERR unknown command 'X  +OK'\r\n");

        let (parsed, consumed) = crate::protocol::parse_message(&wire).unwrap().unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(parsed, RespValue::error("ERR unknown command 'X  +OK'"));

        assert_eq!(RespValue::simple_string("a\nb").serialize(), b"+a b\r\n");
    }

    #[test]
    fn test_bulk_string_is_binary_safe() {
        let value = RespValue::bulk_string(Bytes::from_static(b"a\r\nb"));
        assert_eq!(value.serialize(), b"$4\r\na\r\nb\r\n");
    }

    #[test]
    fn test_command_frame() {
        let frame = RespValue::command(["SET", "key:1", "v1"].map(Bytes::from));
        assert_eq!(
            frame.serialize(),
            b"*3\r\n$3\r\nSET\r\n$5\r\nkey:1\r\n$2\r\nv1\r\n"
        );
    }

    #[test]
    fn test_to_bytes_accepts_both_string_kinds() {
        assert_eq!(
            RespValue::simple_string("k.del").to_bytes(),
            Some(Bytes::from("k.del"))
        );
        assert_eq!(
            RespValue::bulk_string("k.del").to_bytes(),
            Some(Bytes::from("k.del"))
        );
        assert_eq!(RespValue::integer(1).to_bytes(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(RespValue::integer(3).to_string(), "(integer) 3");
        assert_eq!(RespValue::simple_string("PASS").to_string(), "PASS");
        let keys = RespValue::array(vec![
            RespValue::bulk_string("a"),
            RespValue::bulk_string("b"),
        ]);
        assert_eq!(keys.to_string(), "1) \"a\"\n2) \"b\"");
        assert_eq!(RespValue::array(vec![]).to_string(), "(empty array)");
    }
}
