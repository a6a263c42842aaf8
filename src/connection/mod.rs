//! Client Connection Module
//!
//! Accepts RESP clients, runs module commands for them and forwards every
//! other command to the host.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     accept_loop                             │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept(), HostSource::open()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ConnectionHandler<Backend>                     │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐  │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Module or Host  │  │
//! │  └─────────────┘    └─────────────┘    └────────┬────────┘  │
//! │                                                 ▼           │
//! │                                          ┌─────────────┐    │
//! │                                          │ Send reply  │    │
//! │                                          └─────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use kbulk::connection::{accept_loop, ConnectionStats};
//! use kbulk::host::{HostSource, MemoryHost};
//! use kbulk::module::Module;
//! use std::sync::Arc;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:6380").await?;
//! let module = Arc::new(Module::load("k")?);
//! let stats = Arc::new(ConnectionStats::new());
//! accept_loop(listener, HostSource::Memory(MemoryHost::new()), module, stats).await;
//! ```

pub mod handler;

pub use handler::{
    accept_loop, handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, Route,
};
