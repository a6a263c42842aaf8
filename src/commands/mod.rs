//! Module Command Handlers
//!
//! This module holds the argument validation and the logic of the three
//! module commands. It never touches data directly: every read and write goes
//! through the request's [`Context`](crate::module::Context).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Module          │  lookup by name, arity table
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ModuleCommand   │  (this module)
//! │                 │
//! │  - parse        │
//! │  - execute      │
//! └────────┬────────┘
//!          │ keys / delete / set / get
//!          ▼
//! ┌─────────────────┐
//! │ Context ─> Host │
//! └─────────────────┘
//! ```
//!
//! ## Commands
//!
//! - `<ns>.del pattern` - delete every key matching `pattern`, reply with the count
//! - `<ns>.set pattern value` - overwrite every matching key, reply with the count
//! - `<ns>.test` - run the embedded scenarios, reply `PASS`

pub mod handler;

pub use handler::{pattern_delete, pattern_set, self_test, ModuleCommand};
