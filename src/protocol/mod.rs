//! RESP Protocol Implementation
//!
//! The proxy speaks RESP2 in both directions: it accepts client requests and
//! issues host calls to an upstream server with the same value type and
//! parser.
//!
//! - `types`: the [`RespValue`] enum and its serializer
//! - `parser`: incremental parser for requests and replies
//!
//! ## Example
//!
//! ```
//! use kbulk::protocol::{parse_message, RespValue};
//!
//! let data = b"*2\r\n$5\r\nk.del\r\n$6\r\nuser:*\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::integer(3);
//! assert_eq!(reply.serialize(), b":3\r\n");
//! # drop(value);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
