//! Host Interface
//!
//! Everything the bulk commands do to data goes through the [`Host`] trait:
//! enumerate keys by pattern, delete a key, overwrite a key, read a key back.
//! Pattern semantics, storage and atomicity belong to the host.
//!
//! ## Implementations
//!
//! ```text
//!                    ┌──────────────────────┐
//!                    │     trait Host       │
//!                    │ keys/delete/set/get  │
//!                    │      forward         │
//!                    └──────────┬───────────┘
//!              ┌────────────────┴────────────────┐
//!              ▼                                 ▼
//!   ┌─────────────────────┐          ┌──────────────────────┐
//!   │     MemoryHost      │          │      RemoteHost      │
//!   │ embedded, sharded   │          │ RESP client to an    │
//!   │ Arc<RwLock> store   │          │ upstream server      │
//!   └─────────────────────┘          └──────────────────────┘
//! ```
//!
//! [`Backend`] picks one of the two at runtime and [`HostSource`] opens a
//! fresh backend for every client connection.

pub mod glob;
pub mod memory;
pub mod remote;

pub use memory::MemoryHost;
pub use remote::RemoteHost;

use crate::protocol::{ParseError, RespValue};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by host calls.
#[derive(Debug, Error)]
pub enum HostError {
    /// Network failure talking to the host
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host sent bytes that are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The host answered with an error reply; the message is kept verbatim
    #[error("{0}")]
    Reply(String),

    /// The host answered with a reply of the wrong shape
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },

    /// The host closed the connection mid-call
    #[error("host closed the connection")]
    Disconnected,

    /// Connect or round trip exceeded the configured timeout
    #[error("host call timed out after {0:?}")]
    Timeout(Duration),
}

impl HostError {
    /// Converts the error into the reply sent to the caller.
    ///
    /// Error replies from the host pass through unchanged so the caller sees
    /// exactly what the host said; transport failures are wrapped.
    pub fn to_reply(&self) -> RespValue {
        match self {
            HostError::Reply(message) => RespValue::error(message.clone()),
            other => RespValue::error(format!("ERR host call failed: {}", other)),
        }
    }

    /// Whether the error leaves a connection-based host out of step with
    /// its peer, so no later reply on that connection can be trusted.
    ///
    /// Error replies and wrong-shaped replies are whole frames and leave
    /// the connection usable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HostError::Io(_)
                | HostError::Protocol(_)
                | HostError::Disconnected
                | HostError::Timeout(_)
        )
    }
}

/// Typed operations the bulk commands need from a key-value host.
#[async_trait]
pub trait Host: Send {
    /// Returns every key matching the glob `pattern`.
    async fn keys(&mut self, pattern: &[u8]) -> Result<Vec<Bytes>, HostError>;

    /// Removes `key`. Returns whether it existed.
    async fn delete(&mut self, key: &Bytes) -> Result<bool, HostError>;

    /// Overwrites `key` with `value`.
    async fn set(&mut self, key: &Bytes, value: &Bytes) -> Result<(), HostError>;

    /// Reads `key`.
    async fn get(&mut self, key: &Bytes) -> Result<Option<Bytes>, HostError>;

    /// Executes a command the module does not own and returns the host's reply.
    ///
    /// Error replies are returned as `Ok(RespValue::Error(..))`; `Err` means
    /// the host could not be reached.
    async fn forward(&mut self, args: &[Bytes]) -> Result<RespValue, HostError>;

    /// Whether further calls can succeed. Once this is false every call
    /// fails with [`HostError::Disconnected`].
    fn is_available(&self) -> bool {
        true
    }
}

/// A host chosen at runtime.
#[derive(Debug)]
pub enum Backend {
    Memory(MemoryHost),
    Remote(RemoteHost),
}

#[async_trait]
impl Host for Backend {
    async fn keys(&mut self, pattern: &[u8]) -> Result<Vec<Bytes>, HostError> {
        match self {
            Backend::Memory(host) => host.keys(pattern).await,
            Backend::Remote(host) => host.keys(pattern).await,
        }
    }

    async fn delete(&mut self, key: &Bytes) -> Result<bool, HostError> {
        match self {
            Backend::Memory(host) => host.delete(key).await,
            Backend::Remote(host) => host.delete(key).await,
        }
    }

    async fn set(&mut self, key: &Bytes, value: &Bytes) -> Result<(), HostError> {
        match self {
            Backend::Memory(host) => host.set(key, value).await,
            Backend::Remote(host) => host.set(key, value).await,
        }
    }

    async fn get(&mut self, key: &Bytes) -> Result<Option<Bytes>, HostError> {
        match self {
            Backend::Memory(host) => host.get(key).await,
            Backend::Remote(host) => host.get(key).await,
        }
    }

    async fn forward(&mut self, args: &[Bytes]) -> Result<RespValue, HostError> {
        match self {
            Backend::Memory(host) => host.forward(args).await,
            Backend::Remote(host) => host.forward(args).await,
        }
    }

    fn is_available(&self) -> bool {
        match self {
            Backend::Memory(host) => host.is_available(),
            Backend::Remote(host) => host.is_available(),
        }
    }
}

/// Where per-connection backends come from.
#[derive(Debug, Clone)]
pub enum HostSource {
    /// Every connection shares one embedded store.
    Memory(MemoryHost),
    /// Every connection opens its own upstream connection.
    Remote { addr: String, timeout: Duration },
}

impl HostSource {
    /// Opens a backend for one client connection.
    pub async fn open(&self) -> Result<Backend, HostError> {
        match self {
            HostSource::Memory(host) => Ok(Backend::Memory(host.clone())),
            HostSource::Remote { addr, timeout } => {
                let host = RemoteHost::connect(addr, *timeout).await?;
                Ok(Backend::Remote(host))
            }
        }
    }
}

impl fmt::Display for HostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSource::Memory(_) => write!(f, "embedded memory host"),
            HostSource::Remote { addr, .. } => write!(f, "upstream {}", addr),
        }
    }
}
