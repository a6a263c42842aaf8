//! Module Registration and Dispatch
//!
//! A [`Module`] owns the command table for one namespace. Loading it with
//! namespace `k` registers:
//!
//! | Name     | Arity | Flags        | Handler                      |
//! |----------|-------|--------------|------------------------------|
//! | `k.del`  | 2     | write fast   | delete keys matching pattern |
//! | `k.set`  | 3     | write fast   | overwrite keys matching pattern |
//! | `k.test` | -1    | write        | embedded smoke scenarios     |
//!
//! Arity follows the Redis convention: it counts the command name, and a
//! negative value means "at least".
//!
//! ```text
//!  args ──> lookup ──> ModuleCommand::parse ──> Context::new ──> execute
//!             │               │                                    │
//!          not ours      wrong arity                        reply / host error
//!             ▼               ▼                                    ▼
//!           None      Some(-ERR wrong number...)              Some(reply)
//! ```

pub mod context;

pub use context::Context;

use crate::commands::ModuleCommand;
use crate::error::ModuleError;
use crate::host::Host;
use crate::protocol::RespValue;
use bytes::Bytes;
use tracing::{debug, warn};

/// Version reported for the module.
pub const MODULE_VERSION: u32 = 1;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "k";

/// The commands this module provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    PatternDelete,
    PatternSet,
    SelfTest,
}

impl CommandKind {
    pub const ALL: [CommandKind; 3] = [
        CommandKind::PatternDelete,
        CommandKind::PatternSet,
        CommandKind::SelfTest,
    ];

    fn suffix(self) -> &'static str {
        match self {
            CommandKind::PatternDelete => "del",
            CommandKind::PatternSet => "set",
            CommandKind::SelfTest => "test",
        }
    }

    fn arity(self) -> i64 {
        match self {
            CommandKind::PatternDelete => 2,
            CommandKind::PatternSet => 3,
            CommandKind::SelfTest => -1,
        }
    }

    fn flags(self) -> &'static [&'static str] {
        match self {
            CommandKind::PatternDelete | CommandKind::PatternSet => &["write", "fast"],
            CommandKind::SelfTest => &["write"],
        }
    }
}

/// One registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub kind: CommandKind,
    pub arity: i64,
    pub flags: &'static [&'static str],
}

impl CommandSpec {
    fn new(namespace: &str, kind: CommandKind) -> Self {
        Self {
            name: format!("{}.{}", namespace, kind.suffix()),
            kind,
            arity: kind.arity(),
            flags: kind.flags(),
        }
    }

    /// Whether `argc` words (command name included) satisfy the arity.
    pub fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i64;
        if self.arity >= 0 {
            argc == self.arity
        } else {
            argc >= -self.arity
        }
    }

    /// `COMMAND INFO` entry: name, arity, flags, first key, last key, step.
    pub fn info(&self) -> RespValue {
        // The pattern is not a key, so no key positions are declared.
        RespValue::array(vec![
            RespValue::bulk_string(Bytes::from(self.name.clone())),
            RespValue::integer(self.arity),
            RespValue::array(
                self.flags
                    .iter()
                    .map(|flag| RespValue::simple_string(*flag))
                    .collect(),
            ),
            RespValue::integer(0),
            RespValue::integer(0),
            RespValue::integer(0),
        ])
    }
}

/// The loaded module: a namespace and its command table.
#[derive(Debug, Clone)]
pub struct Module {
    namespace: String,
    commands: Vec<CommandSpec>,
}

impl Module {
    /// Validates `namespace` and registers the module commands under it.
    pub fn load(namespace: &str) -> Result<Self, ModuleError> {
        let valid = !namespace.is_empty()
            && namespace
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(ModuleError::InvalidNamespace(namespace.to_string()));
        }

        let commands = CommandKind::ALL
            .into_iter()
            .map(|kind| CommandSpec::new(namespace, kind))
            .collect();

        Ok(Self {
            namespace: namespace.to_string(),
            commands,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> u32 {
        MODULE_VERSION
    }

    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Finds a registered command by name, ignoring ASCII case.
    pub fn lookup(&self, name: &[u8]) -> Option<&CommandSpec> {
        self.commands
            .iter()
            .find(|spec| spec.name.as_bytes().eq_ignore_ascii_case(name))
    }

    /// Finds a registered command by kind.
    pub fn spec(&self, kind: CommandKind) -> Option<&CommandSpec> {
        self.commands.iter().find(|spec| spec.kind == kind)
    }

    /// Runs `args` if its first word names a module command.
    ///
    /// Returns `None` when the command belongs to someone else, so the
    /// caller can forward it to the host.
    pub async fn execute<H>(&self, host: &mut H, args: &[Bytes]) -> Option<RespValue>
    where
        H: Host + ?Sized,
    {
        let (name, rest) = args.split_first()?;
        let spec = self.lookup(name)?;
        Some(self.run(host, spec, rest).await)
    }

    /// Runs a registered command with its arguments (name excluded).
    pub async fn run<H>(&self, host: &mut H, spec: &CommandSpec, args: &[Bytes]) -> RespValue
    where
        H: Host + ?Sized,
    {
        let command = match ModuleCommand::parse(spec, args) {
            Ok(command) => command,
            Err(e) => {
                debug!(command = %spec.name, argc = args.len() + 1, "Rejected call");
                return e.to_reply();
            }
        };

        let mut ctx = Context::new(host, spec.name.as_str());
        match command.execute(&mut ctx).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(command = %spec.name, calls = ctx.calls(), error = %e, "Command failed");
                e.to_reply()
            }
        }
    }

    /// `COMMAND INFO` reply for `names`, when every name is a module command.
    ///
    /// Returns `None` if any name belongs to the host, so the request can be
    /// forwarded instead. An empty `names` describes the whole table.
    pub fn command_info(&self, names: &[Bytes]) -> Option<RespValue> {
        if names.is_empty() {
            return Some(RespValue::array(
                self.commands.iter().map(CommandSpec::info).collect(),
            ));
        }
        let entries = names
            .iter()
            .map(|name| self.lookup(name).map(CommandSpec::info))
            .collect::<Option<Vec<_>>>()?;
        Some(RespValue::array(entries))
    }

    /// `MODULE LIST` reply: one entry with the module name and version.
    pub fn module_list(&self) -> RespValue {
        RespValue::array(vec![RespValue::array(vec![
            RespValue::simple_string("name"),
            RespValue::bulk_string(Bytes::from(self.namespace.clone())),
            RespValue::simple_string("ver"),
            RespValue::integer(i64::from(self.version())),
        ])])
    }
}
