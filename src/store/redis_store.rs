//! Synchronous, Redis-crate-backed [`Store`](super::Store) implementation.
//!
//! Talks to a Redis-compatible hash store with key-space change
//! notifications, using the `redis` crate — the standard, canonical
//! choice for the ecosystem.
//!
//! Uses a synchronous client deliberately: the whole process is a single
//! `poll(2)`-driven event loop, so there is no async runtime whose
//! cooperative suspension this would need to integrate with. A dedicated
//! second connection carries pubsub traffic, kept separate from the one
//! used for ordinary hash commands so a blocking subscribe read can never
//! stall a reconcile pass.

use super::{Store, StoreError, StoreEvent};
use redis::Commands;
use std::collections::HashMap;
use std::time::Duration;

/// A connected Redis store, addressing hash keys as `table{separator}key`.
pub struct RedisStore {
    conn: redis::Connection,
    pubsub_conn: redis::Connection,
    db: u8,
    separator: String,
    subscribed_patterns: Vec<String>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("db", &self.db)
            .field("separator", &self.separator)
            .field("subscribed_patterns", &self.subscribed_patterns)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to `url` selecting database `db`. `separator` is normally
    /// `"|"`.
    pub fn connect(url: &str, db: u8, separator: impl Into<String>) -> Result<Self, StoreError> {
        let addressed = url_with_db(url, db);
        let client =
            redis::Client::open(addressed.as_str()).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = client
            .get_connection()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let pubsub_conn = client
            .get_connection()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            conn,
            pubsub_conn,
            db,
            separator: separator.into(),
            subscribed_patterns: Vec::new(),
        })
    }

    fn full_key(&self, table: &str, key: &str) -> String {
        format!("{table}{}{key}", self.separator)
    }
}

/// Joins a db index into a key pattern, matching Redis's
/// `__keyspace@<db>__:<pattern>` channel-naming convention for key-space
/// notifications. Used internally by [`RedisStore::psubscribe`] — callers
/// of [`Store::psubscribe`] pass plain glob patterns.
#[must_use]
pub fn keyspace_pattern(db: u8, pattern: &str) -> String {
    format!("__keyspace@{db}__:{pattern}")
}

/// Appends a database selector to a Redis connection URL. Unix-socket
/// URLs take the database via a `db` query parameter (there is no path
/// segment for it); TCP URLs take it as the path.
fn url_with_db(base: &str, db: u8) -> String {
    if base.starts_with("unix://") {
        if base.contains('?') {
            format!("{base}&db={db}")
        } else {
            format!("{base}?db={db}")
        }
    } else {
        let trimmed = base.trim_end_matches('/');
        format!("{trimmed}/{db}")
    }
}

impl Store for RedisStore {
    fn hget(&mut self, table: &str, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let full = self.full_key(table, key);
        self.conn
            .hget(&full, field)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn hgetall(&mut self, table: &str, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let full = self.full_key(table, key);
        self.conn
            .hgetall(&full)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn hset(
        &mut self,
        table: &str,
        key: &str,
        mapping: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let full = self.full_key(table, key);
        let pairs: Vec<(&String, &String)> = mapping.iter().collect();
        self.conn
            .hset_multiple(&full, &pairs)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn hdel(&mut self, table: &str, key: &str, fields: &[&str]) -> Result<(), StoreError> {
        let full = self.full_key(table, key);
        self.conn
            .hdel(&full, fields)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.conn
            .keys(pattern)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn psubscribe(&mut self, patterns: &[&str]) -> Result<(), StoreError> {
        let mut pubsub = self.pubsub_conn.as_pubsub();
        for pattern in patterns {
            let channel = keyspace_pattern(self.db, pattern);
            pubsub
                .psubscribe(&channel)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            self.subscribed_patterns.push(channel);
        }
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<StoreEvent>, StoreError> {
        let mut pubsub = self.pubsub_conn.as_pubsub();
        pubsub
            .set_read_timeout(Some(timeout))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match pubsub.get_message() {
            Ok(msg) => {
                let channel = msg.get_channel_name().to_string();
                let event_name: String = msg.get_payload().unwrap_or_default();
                Ok(Some(StoreEvent { channel, event_name }))
            }
            Err(e) if e.is_timeout() => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if !self.subscribed_patterns.is_empty() {
            let mut pubsub = self.pubsub_conn.as_pubsub();
            for pattern in &self.subscribed_patterns {
                let _ = pubsub.punsubscribe(pattern);
            }
        }
        Ok(())
    }
}
