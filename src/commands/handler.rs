//! Pattern Command Handlers
//!
//! Each handler is the same two-step loop: ask the host for the keys
//! matching a pattern, then issue one write per key. The reply is the number
//! of keys the lookup returned.
//!
//! The batch is not atomic. If a host call fails, the keys handled before it
//! stay deleted (or overwritten) and the error is returned to the caller.

use crate::error::CommandError;
use crate::host::{Host, HostError};
use crate::module::{CommandKind, CommandSpec, Context};
use crate::protocol::RespValue;
use bytes::Bytes;
use tracing::{debug, info};

/// Keys seeded and removed by the delete scenario of the self-test.
const DELETE_SCENARIO_PATTERN: &str = "key:for:delete:*";

/// Keys seeded, overwritten and removed by the set scenario of the self-test.
const SET_SCENARIO_PATTERN: &str = "key:for:set:*";

/// A validated module command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleCommand {
    /// `<ns>.del <pattern>`
    PatternDelete { pattern: Bytes },
    /// `<ns>.set <pattern> <value>`
    PatternSet { pattern: Bytes, value: Bytes },
    /// `<ns>.test`
    SelfTest,
}

impl ModuleCommand {
    /// Checks `args` (command name excluded) against the registered arity.
    ///
    /// The arity comes from the command kind, so a call that passes the
    /// check always has the arguments its kind reads.
    pub fn parse(spec: &CommandSpec, args: &[Bytes]) -> Result<Self, CommandError> {
        if !spec.accepts(args.len() + 1) {
            return Err(CommandError::WrongArity {
                command: spec.name.clone(),
            });
        }

        let command = match spec.kind {
            CommandKind::PatternDelete => ModuleCommand::PatternDelete {
                pattern: args[0].clone(),
            },
            CommandKind::PatternSet => ModuleCommand::PatternSet {
                pattern: args[0].clone(),
                value: args[1].clone(),
            },
            CommandKind::SelfTest => ModuleCommand::SelfTest,
        };
        Ok(command)
    }

    /// Runs the command against the request's host.
    pub async fn execute<H>(self, ctx: &mut Context<'_, H>) -> Result<RespValue, CommandError>
    where
        H: Host + ?Sized,
    {
        match self {
            ModuleCommand::PatternDelete { pattern } => {
                let count = pattern_delete(ctx, &pattern).await?;
                Ok(RespValue::integer(count as i64))
            }
            ModuleCommand::PatternSet { pattern, value } => {
                let count = pattern_set(ctx, &pattern, &value).await?;
                Ok(RespValue::integer(count as i64))
            }
            ModuleCommand::SelfTest => {
                self_test(ctx).await?;
                Ok(RespValue::simple_string("PASS"))
            }
        }
    }
}

/// Deletes every key matching `pattern`; returns how many keys matched.
pub async fn pattern_delete<H>(ctx: &mut Context<'_, H>, pattern: &[u8]) -> Result<u64, HostError>
where
    H: Host + ?Sized,
{
    let keys = ctx.keys(pattern).await?;
    for key in &keys {
        ctx.delete(key).await?;
    }

    debug!(
        command = ctx.command(),
        pattern = %String::from_utf8_lossy(pattern),
        keys = keys.len(),
        "Deleted keys by pattern"
    );
    Ok(keys.len() as u64)
}

/// Overwrites every key matching `pattern` with `value`; returns how many keys matched.
pub async fn pattern_set<H>(
    ctx: &mut Context<'_, H>,
    pattern: &[u8],
    value: &Bytes,
) -> Result<u64, HostError>
where
    H: Host + ?Sized,
{
    let keys = ctx.keys(pattern).await?;
    for key in &keys {
        ctx.set(key, value).await?;
    }

    debug!(
        command = ctx.command(),
        pattern = %String::from_utf8_lossy(pattern),
        keys = keys.len(),
        "Set keys by pattern"
    );
    Ok(keys.len() as u64)
}

/// Runs the embedded smoke scenarios against the host.
///
/// 1. Seed `key:for:delete:1..3`, delete `key:for:delete:*`, expect 3 and
///    no remaining matches.
/// 2. Seed `key:for:set:1..3`, set `key:for:set:*` to `updated`, expect 3
///    and read each key back, then clean up.
///
/// Leftovers from an interrupted earlier run are cleared before seeding.
pub async fn self_test<H>(ctx: &mut Context<'_, H>) -> Result<(), CommandError>
where
    H: Host + ?Sized,
{
    delete_scenario(ctx).await?;
    set_scenario(ctx).await?;
    info!(command = ctx.command(), calls = ctx.calls(), "Self-test passed");
    Ok(())
}

async fn delete_scenario<H>(ctx: &mut Context<'_, H>) -> Result<(), CommandError>
where
    H: Host + ?Sized,
{
    let pattern = DELETE_SCENARIO_PATTERN.as_bytes();
    pattern_delete(ctx, pattern).await?;

    let keys = seed(ctx, "key:for:delete", |i| format!("v{}", i)).await?;
    expect_count("delete", keys.len() as u64, pattern_delete(ctx, pattern).await?)?;
    expect_count("delete leaves no matches", 0, ctx.keys(pattern).await?.len() as u64)?;
    Ok(())
}

async fn set_scenario<H>(ctx: &mut Context<'_, H>) -> Result<(), CommandError>
where
    H: Host + ?Sized,
{
    let pattern = SET_SCENARIO_PATTERN.as_bytes();
    let updated = Bytes::from_static(b"updated");
    pattern_delete(ctx, pattern).await?;

    let keys = seed(ctx, "key:for:set", |_| "old".to_string()).await?;
    expect_count("set", keys.len() as u64, pattern_set(ctx, pattern, &updated).await?)?;

    for key in &keys {
        let value = ctx.get(key).await?;
        if value.as_ref() != Some(&updated) {
            return Err(CommandError::SelfTest {
                scenario: "set read-back",
                expected: format!("{:?}", Some(&updated)),
                actual: format!("{:?}", value),
            });
        }
    }

    pattern_delete(ctx, pattern).await?;
    Ok(())
}

/// Writes `<prefix>:1..3`, returning the keys written.
async fn seed<H, F>(ctx: &mut Context<'_, H>, prefix: &str, value: F) -> Result<Vec<Bytes>, HostError>
where
    H: Host + ?Sized,
    F: Fn(usize) -> String,
{
    let mut keys = Vec::with_capacity(3);
    for i in 1..=3 {
        let key = Bytes::from(format!("{}:{}", prefix, i));
        ctx.set(&key, &Bytes::from(value(i))).await?;
        keys.push(key);
    }
    Ok(keys)
}

fn expect_count(scenario: &'static str, expected: u64, actual: u64) -> Result<(), CommandError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CommandError::SelfTest {
            scenario,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
