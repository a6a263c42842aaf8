//! Connection Handler Module
//!
//! Each client connection is served by its own task that owns a host
//! [`Backend`] handle for the lifetime of the connection.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, HostSource::open() gives the task its backend
//!        │
//!        ▼
//! 2. ┌──────────────────────────────────────┐
//!    │  Read bytes ─> Parse RESP command    │
//!    │        │                             │
//!    │        ▼                             │
//!    │  <ns>.* ?  ── yes ─> Module::run     │
//!    │        │                             │
//!    │        no ──> Host::forward          │
//!    │        │                             │
//!    │        ▼                             │
//!    │  Send reply, loop                    │
//!    └──────────────────────────────────────┘
//!        │
//!        ▼
//! 3. Client disconnects, sends QUIT, or the backend's upstream connection
//!    fails; backend is dropped
//! ```
//!
//! The proxy itself answers `QUIT`, `MODULE LIST` and `COMMAND INFO` for
//! module command names. Everything else not owned by the module goes to the
//! host unchanged.

use crate::host::{Backend, Host, HostSource};
use crate::module::Module;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: one bulk string at the parser's limit
/// plus 64 KB for the rest of the request
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Commands handled by the module
    pub module_commands: AtomicU64,
    /// Commands passed through to the host
    pub forwarded_commands: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self, route: Route) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        match route {
            Route::Module => self.module_commands.fetch_add(1, Ordering::Relaxed),
            Route::Forwarded => self.forwarded_commands.fetch_add(1, Ordering::Relaxed),
            Route::Local => 0,
        };
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Where a command was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// By a module command handler
    Module,
    /// By the host, via `forward`
    Forwarded,
    /// By the proxy itself (QUIT, MODULE LIST, COMMAND INFO, bad frames)
    Local,
}

/// Handles a single client connection.
pub struct ConnectionHandler<H: Host> {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// This connection's host handle
    host: H,

    /// The module command table (shared)
    module: Arc<Module>,

    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<H: Host> ConnectionHandler<H> {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        host: H,
        module: Arc<Module>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            host,
            module,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Runs the connection until the client leaves or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(command) = self.try_parse_command()? {
                let (response, route, quit) = self.execute(command).await;
                self.stats.command_processed(route);
                self.send_response(&response).await?;
                if quit {
                    return Ok(());
                }
                if !self.host.is_available() {
                    return Err(ConnectionError::HostUnavailable);
                }
            }

            self.read_more_data().await?;
        }
    }

    /// Routes one request; returns the reply, who answered it, and whether
    /// the client asked to close.
    async fn execute(&mut self, command: RespValue) -> (RespValue, Route, bool) {
        let args = match request_words(command) {
            Ok(args) => args,
            Err(reply) => return (reply, Route::Local, false),
        };

        if let Some(reply) = self.module.execute(&mut self.host, &args).await {
            return (reply, Route::Module, false);
        }

        let name = String::from_utf8_lossy(&args[0]).to_uppercase();
        match (name.as_str(), args.get(1).map(|a| a.to_ascii_uppercase())) {
            ("QUIT", _) => return (RespValue::ok(), Route::Local, true),
            ("MODULE", Some(sub)) if sub == b"LIST".as_slice() && args.len() == 2 => {
                return (self.module.module_list(), Route::Local, false)
            }
            ("COMMAND", Some(sub)) if sub == b"INFO".as_slice() => {
                if let Some(info) = self.module.command_info(&args[2..]) {
                    return (info, Route::Local, false);
                }
            }
            _ => {}
        }

        match self.host.forward(&args).await {
            Ok(reply) => (reply, Route::Forwarded, false),
            Err(e) => {
                warn!(client = %self.addr, command = %name, error = %e, "Host call failed");
                (e.to_reply(), Route::Forwarded, false)
            }
        }
    }

    fn try_parse_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        Ok(())
    }
}

/// Flattens a request frame into its words.
fn request_words(command: RespValue) -> Result<Vec<Bytes>, RespValue> {
    let items = match command {
        RespValue::Array(items) if !items.is_empty() => items,
        RespValue::Array(_) => return Err(RespValue::error("ERR empty command")),
        _ => return Err(RespValue::error("ERR invalid command format")),
    };

    items
        .iter()
        .map(RespValue::to_bytes)
        .collect::<Option<Vec<Bytes>>>()
        .ok_or_else(|| RespValue::error("ERR invalid command argument"))
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("Client disconnected")]
    ClientDisconnected,

    /// The client closed the socket in the middle of a command
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// The host connection failed and was abandoned
    #[error("Host connection lost")]
    HostUnavailable,
}

/// Serves one client connection to completion.
pub async fn handle_connection<H: Host>(
    stream: TcpStream,
    addr: SocketAddr,
    host: H,
    module: Arc<Module>,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, host, module, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

/// Accepts clients forever, giving each its own backend from `source`.
pub async fn accept_loop(
    listener: TcpListener,
    source: HostSource,
    module: Arc<Module>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let source = source.clone();
                let module = Arc::clone(&module);
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    match source.open().await {
                        Ok(host) => {
                            handle_connection::<Backend>(stream, addr, host, module, stats).await
                        }
                        Err(e) => reject(stream, addr, e).await,
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Tells a client its host is unavailable and closes the connection.
async fn reject(mut stream: TcpStream, addr: SocketAddr, e: crate::host::HostError) {
    warn!(client = %addr, error = %e, "Host unavailable, closing client");
    let reply = RespValue::error(format!("ERR host unavailable: {}", e));
    let _ = stream.write_all(&reply.serialize()).await;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use std::time::Duration;

    /// A minimal RESP client for driving the server in tests.
    struct TestClient {
        stream: TcpStream,
        buffer: BytesMut,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                buffer: BytesMut::new(),
            }
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.stream.write_all(bytes).await.unwrap();
        }

        async fn read_reply(&mut self) -> RespValue {
            let mut parser = RespParser::new();
            loop {
                if let Some((value, used)) = parser.parse(&self.buffer).unwrap() {
                    let _ = self.buffer.split_to(used);
                    return value;
                }
                let n = tokio::time::timeout(
                    Duration::from_secs(2),
                    self.stream.read_buf(&mut self.buffer),
                )
                .await
                .expect("reply timed out")
                .unwrap();
                assert!(n > 0, "server closed the connection");
            }
        }

        async fn call(&mut self, words: &[&str]) -> RespValue {
            let frame = RespValue::command(words.iter().map(|w| Bytes::copy_from_slice(w.as_bytes())));
            self.send_raw(&frame.serialize()).await;
            self.read_reply().await
        }
    }

    async fn start_server(source: HostSource) -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let module = Arc::new(Module::load("k").unwrap());
        let stats = Arc::new(ConnectionStats::new());

        tokio::spawn(accept_loop(listener, source, module, Arc::clone(&stats)));
        (addr, stats)
    }

    #[tokio::test]
    async fn test_module_commands_over_the_wire() {
        let store = MemoryHost::new();
        let (addr, _) = start_server(HostSource::Memory(store.clone())).await;
        let mut client = TestClient::connect(addr).await;

        for key in ["key:for:delete:1", "key:for:delete:2", "key:for:delete:3"] {
            assert_eq!(client.call(&["SET", key, "v"]).await, RespValue::ok());
        }
        assert_eq!(
            client.call(&["k.del", "key:for:delete:*"]).await,
            RespValue::integer(3)
        );
        assert_eq!(
            client.call(&["KEYS", "key:for:delete:*"]).await,
            RespValue::array(vec![])
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_pattern_set_then_read_back() {
        let (addr, _) = start_server(HostSource::Memory(MemoryHost::new())).await;
        let mut client = TestClient::connect(addr).await;

        client.call(&["SET", "user:1", "a"]).await;
        client.call(&["SET", "user:2", "b"]).await;
        client.call(&["SET", "other", "c"]).await;

        assert_eq!(
            client.call(&["K.SET", "user:*", "z"]).await,
            RespValue::integer(2)
        );
        assert_eq!(client.call(&["GET", "user:1"]).await, RespValue::bulk_string("z"));
        assert_eq!(client.call(&["GET", "user:2"]).await, RespValue::bulk_string("z"));
        assert_eq!(client.call(&["GET", "other"]).await, RespValue::bulk_string("c"));
    }

    #[tokio::test]
    async fn test_wrong_arity_over_the_wire() {
        let (addr, _) = start_server(HostSource::Memory(MemoryHost::new())).await;
        let mut client = TestClient::connect(addr).await;

        assert_eq!(
            client.call(&["k.del"]).await,
            RespValue::error("ERR wrong number of arguments for 'k.del' command")
        );
        assert_eq!(
            client.call(&["k.set", "a", "b", "c"]).await,
            RespValue::error("ERR wrong number of arguments for 'k.set' command")
        );
    }

    #[tokio::test]
    async fn test_self_test_and_introspection() {
        let (addr, _) = start_server(HostSource::Memory(MemoryHost::new())).await;
        let mut client = TestClient::connect(addr).await;

        assert_eq!(client.call(&["k.test"]).await, RespValue::simple_string("PASS"));

        let modules = client.call(&["MODULE", "LIST"]).await.into_array().unwrap();
        assert_eq!(modules.len(), 1);

        let info = client.call(&["COMMAND", "INFO", "k.del"]).await;
        let entry = info.into_array().unwrap().remove(0).into_array().unwrap();
        assert_eq!(entry[1], RespValue::integer(2));
    }

    #[tokio::test]
    async fn test_inline_and_pipelined_commands() {
        let (addr, _) = start_server(HostSource::Memory(MemoryHost::new())).await;
        let mut client = TestClient::connect(addr).await;

        client
            .send_raw(b"SET a:1 x\r\nSET a:2 y\r\nk.del a:*\r\nDBSIZE\r\n")
            .await;
        assert_eq!(client.read_reply().await, RespValue::ok());
        assert_eq!(client.read_reply().await, RespValue::ok());
        assert_eq!(client.read_reply().await, RespValue::integer(2));
        assert_eq!(client.read_reply().await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_values_larger_than_the_initial_buffer() {
        let store = MemoryHost::new();
        let (addr, _) = start_server(HostSource::Memory(store.clone())).await;
        let mut client = TestClient::connect(addr).await;

        client.call(&["SET", "user:1", "old"]).await;
        let big = "x".repeat(100 * 1024);
        assert_eq!(
            client.call(&["k.set", "user:*", big.as_str()]).await,
            RespValue::integer(1)
        );
        assert_eq!(store.lookup(b"user:1").map(|v| v.len()), Some(100 * 1024));
        assert_eq!(
            client.call(&["GET", "user:1"]).await,
            RespValue::bulk_string(Bytes::from(big))
        );
    }

    #[tokio::test]
    async fn test_bad_frames_get_error_replies() {
        let (addr, _) = start_server(HostSource::Memory(MemoryHost::new())).await;
        let mut client = TestClient::connect(addr).await;

        client.send_raw(b"*0\r\n").await;
        assert_eq!(client.read_reply().await, RespValue::error("ERR empty command"));

        client.send_raw(b":5\r\n").await;
        assert_eq!(
            client.read_reply().await,
            RespValue::error("ERR invalid command format")
        );

        client.send_raw(b"*2\r\n$5\r\nk.del\r\n:1\r\n").await;
        assert_eq!(
            client.read_reply().await,
            RespValue::error("ERR invalid command argument")
        );
    }

    #[tokio::test]
    async fn test_quit_closes_and_stats_are_counted() {
        let (addr, stats) = start_server(HostSource::Memory(MemoryHost::new())).await;
        let mut client = TestClient::connect(addr).await;

        client.call(&["SET", "a", "1"]).await;
        client.call(&["k.del", "a"]).await;
        assert_eq!(client.call(&["QUIT"]).await, RespValue::ok());

        let mut rest = Vec::new();
        let n = client.stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
        assert_eq!(stats.module_commands.load(Ordering::Relaxed), 1);
        assert_eq!(stats.forwarded_commands.load(Ordering::Relaxed), 1);
    }

    /// The module running against an upstream server through `RemoteHost`.
    #[tokio::test]
    async fn test_end_to_end_through_an_upstream() {
        let store = MemoryHost::new();
        let (upstream, _) = start_server(HostSource::Memory(store.clone())).await;
        let (proxy, stats) = start_server(HostSource::Remote {
            addr: upstream.to_string(),
            timeout: Duration::from_secs(2),
        })
        .await;
        let mut client = TestClient::connect(proxy).await;

        for i in 1..=3 {
            let key = format!("session:{}", i);
            assert_eq!(client.call(&["SET", key.as_str(), "live"]).await, RespValue::ok());
        }
        store.insert(Bytes::from("keep"), Bytes::from("me"));

        assert_eq!(
            client.call(&["k.set", "session:*", "expired"]).await,
            RespValue::integer(3)
        );
        assert_eq!(store.lookup(b"session:2"), Some(Bytes::from("expired")));

        assert_eq!(
            client.call(&["k.del", "session:*"]).await,
            RespValue::integer(3)
        );
        assert_eq!(store.len(), 1);
        assert_eq!(client.call(&["k.test"]).await, RespValue::simple_string("PASS"));
        assert_eq!(client.call(&["GET", "keep"]).await, RespValue::bulk_string("me"));

        // upstream errors come back verbatim
        assert_eq!(
            client.call(&["HGETALL", "keep"]).await,
            RespValue::error("ERR unknown command 'HGETALL'")
        );
        assert!(stats.forwarded_commands.load(Ordering::Relaxed) >= 5);
    }

    #[tokio::test]
    async fn test_timed_out_upstream_closes_the_client() {
        // accepts and reads, never answers
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = upstream.accept().await {
                tokio::spawn(async move {
                    let mut sink = Vec::new();
                    let _ = socket.read_to_end(&mut sink).await;
                });
            }
        });

        let (proxy, _) = start_server(HostSource::Remote {
            addr: upstream_addr.to_string(),
            timeout: Duration::from_millis(100),
        })
        .await;
        let mut client = TestClient::connect(proxy).await;

        match client.call(&["k.del", "temp:*"]).await {
            RespValue::Error(msg) => {
                assert!(msg.starts_with("ERR host call failed: host call timed out"))
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let mut rest = Vec::new();
        let n = client.stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_reported_to_the_client() {
        // bind then drop to get a port nobody listens on
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let (proxy, _) = start_server(HostSource::Remote {
            addr: dead_addr.to_string(),
            timeout: Duration::from_millis(500),
        })
        .await;
        let mut client = TestClient::connect(proxy).await;

        match client.read_reply().await {
            RespValue::Error(msg) => assert!(msg.starts_with("ERR host unavailable")),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
