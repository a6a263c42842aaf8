//! Upstream RESP Host
//!
//! [`RemoteHost`] talks to a Redis-compatible server over one TCP
//! connection. Each host call is a single request/reply round trip:
//!
//! | Operation  | Request                | Expected reply        |
//! |------------|------------------------|-----------------------|
//! | `keys`     | `KEYS <pattern>`       | array of bulk strings |
//! | `delete`   | `DEL <key>`            | integer               |
//! | `set`      | `SET <key> <value>`    | `+OK`                 |
//! | `get`      | `GET <key>`            | bulk string or null   |
//! | `forward`  | the client's words     | anything              |
//!
//! Replies are read into a `BytesMut` and parsed incrementally, exactly like
//! client requests on the server side.

use crate::host::{Host, HostError};
use crate::protocol::{RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Initial reply buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// A connection to an upstream RESP server.
#[derive(Debug)]
pub struct RemoteHost {
    stream: BufWriter<TcpStream>,
    addr: String,
    buffer: BytesMut,
    parser: RespParser,
    timeout: Duration,
    /// Set after a transport failure; the connection may hold a reply that
    /// belongs to an abandoned request.
    broken: bool,
}

impl RemoteHost {
    /// Connects to `addr` (`host:port`), giving up after `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, HostError> {
        let stream = with_timeout(timeout, async {
            Ok::<_, HostError>(TcpStream::connect(addr).await?)
        })
        .await?;
        stream.set_nodelay(true)?;
        debug!(upstream = %addr, "Connected to upstream host");

        Ok(Self {
            stream: BufWriter::new(stream),
            addr: addr.to_string(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            timeout,
            broken: false,
        })
    }

    /// Address this host is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one command and returns the raw reply, error replies included.
    ///
    /// After a transport failure (timeout, I/O, bad framing, disconnect) the
    /// connection is abandoned and every later call fails with
    /// [`HostError::Disconnected`].
    pub async fn call_raw<W>(&mut self, words: &[W]) -> Result<RespValue, HostError>
    where
        W: AsRef<[u8]>,
    {
        if self.broken {
            return Err(HostError::Disconnected);
        }

        let frame = RespValue::command(words.iter().map(|w| Bytes::copy_from_slice(w.as_ref())));
        let request = frame.serialize();
        let timeout = self.timeout;

        let result = with_timeout(timeout, async {
            self.stream.write_all(&request).await?;
            self.stream.flush().await?;
            self.read_reply().await
        })
        .await;

        if let Err(e) = &result {
            if e.is_transport() {
                warn!(upstream = %self.addr, error = %e, "Abandoning upstream connection");
                self.broken = true;
            }
        }
        result
    }

    /// Sends one command; an error reply becomes [`HostError::Reply`].
    pub async fn call<W>(&mut self, words: &[W]) -> Result<RespValue, HostError>
    where
        W: AsRef<[u8]>,
    {
        match self.call_raw(words).await? {
            RespValue::Error(message) => Err(HostError::Reply(message)),
            reply => Ok(reply),
        }
    }

    async fn read_reply(&mut self) -> Result<RespValue, HostError> {
        loop {
            if let Some((reply, consumed)) = self.parser.parse(&self.buffer)? {
                let _ = self.buffer.split_to(consumed);
                trace!(upstream = %self.addr, consumed, "Parsed reply");
                return Ok(reply);
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }
            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(HostError::Disconnected);
            }
        }
    }
}

async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T, HostError>
where
    F: Future<Output = Result<T, HostError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(HostError::Timeout(timeout)),
    }
}

fn unexpected(command: &'static str, reply: &RespValue) -> HostError {
    HostError::UnexpectedReply {
        command,
        reply: reply.to_string(),
    }
}

#[async_trait]
impl Host for RemoteHost {
    async fn keys(&mut self, pattern: &[u8]) -> Result<Vec<Bytes>, HostError> {
        let reply = self.call(&[&b"KEYS"[..], pattern]).await?;
        let elements = match reply {
            RespValue::Array(elements) => elements,
            other => return Err(unexpected("KEYS", &other)),
        };
        elements
            .iter()
            .map(|element| element.to_bytes().ok_or_else(|| unexpected("KEYS", element)))
            .collect()
    }

    async fn delete(&mut self, key: &Bytes) -> Result<bool, HostError> {
        let reply = self.call(&[&b"DEL"[..], &key[..]]).await?;
        match reply.as_integer() {
            Some(n) => Ok(n > 0),
            None => Err(unexpected("DEL", &reply)),
        }
    }

    async fn set(&mut self, key: &Bytes, value: &Bytes) -> Result<(), HostError> {
        match self.call(&[&b"SET"[..], &key[..], &value[..]]).await? {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(unexpected("SET", &other)),
        }
    }

    async fn get(&mut self, key: &Bytes) -> Result<Option<Bytes>, HostError> {
        match self.call(&[&b"GET"[..], &key[..]]).await? {
            RespValue::BulkString(value) => Ok(Some(value)),
            RespValue::Null => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    async fn forward(&mut self, args: &[Bytes]) -> Result<RespValue, HostError> {
        self.call_raw(args).await
    }

    fn is_available(&self) -> bool {
        !self.broken
    }
}
