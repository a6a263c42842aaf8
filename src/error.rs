//! Error types for module registration and command execution.

use crate::host::HostError;
use crate::protocol::RespValue;
use thiserror::Error;

/// Errors raised while running a module command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The caller passed the wrong number of arguments. Nothing was touched.
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity { command: String },

    /// A host call failed; the command stopped at that point.
    #[error(transparent)]
    Host(#[from] HostError),

    /// An embedded self-test scenario saw an unexpected result.
    #[error("ERR self-test failed: {scenario}: expected {expected}, got {actual}")]
    SelfTest {
        scenario: &'static str,
        expected: String,
        actual: String,
    },
}

impl CommandError {
    /// The error reply sent to the caller.
    pub fn to_reply(&self) -> RespValue {
        match self {
            CommandError::Host(err) => err.to_reply(),
            other => RespValue::error(other.to_string()),
        }
    }
}

/// Errors raised while loading the module.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModuleError {
    #[error("invalid module namespace {0:?}: use ASCII letters, digits, '_' or '-'")]
    InvalidNamespace(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_arity_reply_matches_redis_wording() {
        let err = CommandError::WrongArity {
            command: "k.del".to_string(),
        };
        assert_eq!(
            err.to_reply(),
            RespValue::error("ERR wrong number of arguments for 'k.del' command")
        );
    }

    #[test]
    fn test_host_errors_keep_host_wording() {
        let err = CommandError::from(HostError::Reply("READONLY replica".to_string()));
        assert_eq!(err.to_reply(), RespValue::error("READONLY replica"));
    }

    #[test]
    fn test_self_test_failure_reply() {
        let err = CommandError::SelfTest {
            scenario: "delete",
            expected: "3".to_string(),
            actual: "2".to_string(),
        };
        assert_eq!(
            err.to_reply(),
            RespValue::error("ERR self-test failed: delete: expected 3, got 2")
        );
    }
}
