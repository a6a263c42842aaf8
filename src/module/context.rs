//! Per-request host access.
//!
//! A [`Context`] exists for exactly one command invocation. It holds the
//! host mutably for that time, so a handler cannot outlive its request or
//! share the host with another handler. Key lists and replies obtained
//! through it are ordinary owned values that drop when the handler returns.

use crate::host::{Host, HostError};
use bytes::Bytes;
use std::time::Instant;
use tracing::debug;

/// Scoped view of the host for one command invocation.
pub struct Context<'h, H: Host + ?Sized> {
    host: &'h mut H,
    command: String,
    calls: usize,
    started: Instant,
}

impl<'h, H: Host + ?Sized> Context<'h, H> {
    pub fn new(host: &'h mut H, command: impl Into<String>) -> Self {
        Self {
            host,
            command: command.into(),
            calls: 0,
            started: Instant::now(),
        }
    }

    /// Name of the command this context serves.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Number of host calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub async fn keys(&mut self, pattern: &[u8]) -> Result<Vec<Bytes>, HostError> {
        self.calls += 1;
        self.host.keys(pattern).await
    }

    pub async fn delete(&mut self, key: &Bytes) -> Result<bool, HostError> {
        self.calls += 1;
        self.host.delete(key).await
    }

    pub async fn set(&mut self, key: &Bytes, value: &Bytes) -> Result<(), HostError> {
        self.calls += 1;
        self.host.set(key, value).await
    }

    pub async fn get(&mut self, key: &Bytes) -> Result<Option<Bytes>, HostError> {
        self.calls += 1;
        self.host.get(key).await
    }
}

impl<H: Host + ?Sized> Drop for Context<'_, H> {
    fn drop(&mut self) {
        debug!(
            command = %self.command,
            calls = self.calls,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "Request scope released"
        );
    }
}
