//! Embedded Memory Host
//!
//! A small in-process key-value store that plays the host role when no
//! upstream server is configured, and in tests.
//!
//! ## Design
//!
//! 1. **Sharded Locks**: keys are spread over 64 shards, each a
//!    `RwLock<HashMap>`, so connections touching different keys rarely contend.
//! 2. **Shared Handle**: `MemoryHost` is a cheap `Arc` clone; every client
//!    connection gets its own handle onto the same shards.
//! 3. **No Batch Atomicity**: like a real host, each call takes its own lock.
//!    A pattern command interleaves freely with other clients' writes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        MemoryHost                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::host::{glob, Host, HostError};
use crate::protocol::RespValue;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of shards in the store
const NUM_SHARDS: usize = 64;

type Shard = RwLock<HashMap<Bytes, Bytes>>;

/// Handle onto a shared in-memory key space.
///
/// # Example
///
/// ```
/// use kbulk::host::{Host, MemoryHost};
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let mut host = MemoryHost::new();
/// host.set(&Bytes::from("user:1"), &Bytes::from("ada")).await.unwrap();
///
/// let keys = host.keys(b"user:*").await.unwrap();
/// assert_eq!(keys, vec![Bytes::from("user:1")]);
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryHost {
    shards: Arc<Vec<Shard>>,
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Creates an empty store.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards: Arc::new(shards),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<Bytes, Bytes>> {
        shard.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<Bytes, Bytes>> {
        shard.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns every key matching `pattern`, in no particular order.
    pub fn matching_keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let mut result = Vec::new();
        for shard in self.shards.iter() {
            let data = Self::read(shard);
            result.extend(
                data.keys()
                    .filter(|key| glob::matches(pattern, key))
                    .cloned(),
            );
        }
        result
    }

    pub fn insert(&self, key: Bytes, value: Bytes) {
        Self::write(self.shard(&key)).insert(key, value);
    }

    pub fn remove(&self, key: &[u8]) -> bool {
        Self::write(self.shard(key)).remove(key).is_some()
    }

    pub fn lookup(&self, key: &[u8]) -> Option<Bytes> {
        Self::read(self.shard(key)).get(key).cloned()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        Self::read(self.shard(key)).contains_key(key)
    }

    /// Number of keys across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| Self::read(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            Self::write(shard).clear();
        }
    }

    /// Runs one of the plain commands the embedded host understands.
    fn execute(&self, name: &str, args: &[Bytes]) -> RespValue {
        match (name, args.len()) {
            ("PING", 0) => RespValue::simple_string("PONG"),
            ("PING", 1) | ("ECHO", 1) => RespValue::bulk_string(args[0].clone()),
            ("GET", 1) => match self.lookup(&args[0]) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },
            ("SET", 2) => {
                self.insert(args[0].clone(), args[1].clone());
                RespValue::ok()
            }
            ("DEL", n) if n > 0 => {
                let removed = args.iter().filter(|key| self.remove(key)).count();
                RespValue::integer(removed as i64)
            }
            ("EXISTS", n) if n > 0 => {
                let found = args.iter().filter(|key| self.contains(key)).count();
                RespValue::integer(found as i64)
            }
            ("KEYS", 1) => RespValue::array(
                self.matching_keys(&args[0])
                    .into_iter()
                    .map(RespValue::bulk_string)
                    .collect(),
            ),
            ("DBSIZE", 0) => RespValue::integer(self.len() as i64),
            ("FLUSHDB", 0) | ("FLUSHALL", 0) => {
                self.clear();
                RespValue::ok()
            }
            ("PING" | "ECHO" | "GET" | "SET" | "DEL" | "EXISTS" | "KEYS" | "DBSIZE"
            | "FLUSHDB" | "FLUSHALL", _) => RespValue::error(format!(
                "ERR wrong number of arguments for '{}' command",
                name.to_lowercase()
            )),
            _ => RespValue::error(format!("ERR unknown command '{}'", name)),
        }
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn keys(&mut self, pattern: &[u8]) -> Result<Vec<Bytes>, HostError> {
        Ok(self.matching_keys(pattern))
    }

    async fn delete(&mut self, key: &Bytes) -> Result<bool, HostError> {
        Ok(self.remove(key))
    }

    async fn set(&mut self, key: &Bytes, value: &Bytes) -> Result<(), HostError> {
        self.insert(key.clone(), value.clone());
        Ok(())
    }

    async fn get(&mut self, key: &Bytes) -> Result<Option<Bytes>, HostError> {
        Ok(self.lookup(key))
    }

    async fn forward(&mut self, args: &[Bytes]) -> Result<RespValue, HostError> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(RespValue::error("ERR empty command"));
        };
        let name = String::from_utf8_lossy(name).to_uppercase();
        Ok(self.execute(&name, rest))
    }
}
