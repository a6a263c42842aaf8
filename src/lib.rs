//! # kbulk - Pattern-Based Bulk Key Commands
//!
//! kbulk adds three commands to a Redis-compatible key-value server:
//!
//! - `k.del pattern` deletes every key matching a glob pattern and replies with the count
//! - `k.set pattern value` overwrites every matching key and replies with the count
//! - `k.test` runs an embedded smoke scenario and replies `PASS`
//!
//! The commands own no data. Each one asks the host for the matching keys and
//! then issues one write per key, so pattern semantics, storage and
//! atomicity all stay with the host.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               kbulk                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│   Module    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  dispatch   │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │ other            │ Context (per request)   │
//! │                            │ commands         ▼                         │
//! │                            │           ┌─────────────┐                  │
//! │                            └──────────>│  trait Host │                  │
//! │                                        └──────┬──────┘                  │
//! │                           ┌───────────────────┴──────────────┐          │
//! │                           ▼                                  ▼          │
//! │                  ┌─────────────────┐              ┌──────────────────┐  │
//! │                  │   MemoryHost    │              │    RemoteHost    │  │
//! │                  │ (embedded store)│              │ (upstream server)│  │
//! │                  └─────────────────┘              └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use bytes::Bytes;
//! use kbulk::host::MemoryHost;
//! use kbulk::module::Module;
//! use kbulk::protocol::RespValue;
//!
//! # tokio_test::block_on(async {
//! let module = Module::load("k").unwrap();
//! let mut host = MemoryHost::new();
//! for i in 1..=3 {
//!     host.insert(Bytes::from(format!("key:for:delete:{}", i)), Bytes::from("v"));
//! }
//!
//! let args = [Bytes::from("k.del"), Bytes::from("key:for:delete:*")];
//! let reply = module.execute(&mut host, &args).await;
//! assert_eq!(reply, Some(RespValue::integer(3)));
//! assert!(host.is_empty());
//! # });
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types and incremental parser
//! - [`host`]: the `Host` trait, embedded and upstream implementations
//! - [`module`]: command table, arity rules, per-request context
//! - [`commands`]: the pattern-delete, pattern-set and self-test handlers
//! - [`connection`]: client connections and the accept loop
//! - [`config`]: command-line and environment configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod module;
pub mod protocol;

pub use config::Config;
pub use connection::{accept_loop, handle_connection, ConnectionStats};
pub use error::{CommandError, ModuleError};
pub use host::{Backend, Host, HostError, HostSource, MemoryHost, RemoteHost};
pub use module::{Context, Module};
pub use protocol::{ParseError, RespParser, RespValue};

/// The default port kbulk listens on (next to a Redis on 6379)
pub const DEFAULT_PORT: u16 = 6380;

/// The default host kbulk binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of kbulk
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
