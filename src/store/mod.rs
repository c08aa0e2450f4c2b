//! Store adapter (C3): a typed wrapper around an external Redis-compatible
//! hash store with key-space change notifications.
//!
//! The rest of the core depends on the [`Store`] trait, not on any
//! specific client — this is what lets the link proxy and supervisor be
//! tested against [`FakeStore`] without a live Redis.

pub mod redis_store;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub use redis_store::{keyspace_pattern, RedisStore};

/// A key-space change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// The keyspace channel the event arrived on, e.g.
    /// `__keyspace@4__:CONSOLE_PORT|1`.
    pub channel: String,
    /// The notification payload, e.g. `"hset"`, `"hdel"`, `"del"`.
    pub event_name: String,
}

/// Errors from the store adapter. Never propagated as-is past the
/// supervisor/link-proxy boundary — callers log a transient failure and
/// retry on the next tick rather than aborting.
#[derive(Debug)]
pub enum StoreError {
    /// The underlying client reported a connection or command failure.
    Backend(String),
    /// An operation was attempted before `connect()` succeeded.
    NotConnected,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "store backend error: {msg}"),
            Self::NotConnected => write!(f, "store is not connected"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The operations the core consumes from the external store.
pub trait Store {
    /// Reads one field of a hash key `table{sep}key`.
    fn hget(&mut self, table: &str, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Reads all fields of a hash key.
    fn hgetall(&mut self, table: &str, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Writes multiple fields of a hash key.
    fn hset(
        &mut self,
        table: &str,
        key: &str,
        mapping: &HashMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Deletes specific fields of a hash key, leaving the rest untouched.
    fn hdel(&mut self, table: &str, key: &str, fields: &[&str]) -> Result<(), StoreError>;

    /// Lists keys matching a glob pattern, e.g. `"CONSOLE_PORT|*"`.
    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Subscribes to key-space change notifications for the given plain
    /// glob patterns. Implementations own joining in any backend-specific
    /// addressing (e.g. a db index) needed to turn a pattern into a real
    /// subscription channel.
    fn psubscribe(&mut self, patterns: &[&str]) -> Result<(), StoreError>;

    /// Waits up to `timeout` for the next subscribed event.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<StoreEvent>, StoreError>;

    /// Unsubscribes and releases the connection.
    fn close(&mut self) -> Result<(), StoreError>;
}

/// Splits a store key of the form `table|id` into its two halves, as used
/// when interpreting `keys(pattern)` results.
#[must_use]
pub fn split_table_key<'a>(full_key: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    full_key.split_once(separator)
}

#[cfg(test)]
pub mod fake;

#[cfg(test)]
pub use fake::FakeStore;
