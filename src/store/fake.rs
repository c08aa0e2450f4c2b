//! In-memory `Store` implementation used by link-proxy and supervisor
//! unit tests so they don't need a live Redis.

use super::{Store, StoreError, StoreEvent};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// An in-memory store with a manually-pushed event queue.
#[derive(Debug, Default)]
pub struct FakeStore {
    tables: HashMap<String, HashMap<String, String>>,
    pending_events: VecDeque<StoreEvent>,
    separator: String,
}

impl FakeStore {
    /// Creates an empty store using `|` as the table/key separator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            pending_events: VecDeque::new(),
            separator: "|".to_string(),
        }
    }

    fn full_key(&self, table: &str, key: &str) -> String {
        format!("{table}{}{key}", self.separator)
    }

    /// Test helper: seeds a hash key directly, bypassing `hset`.
    pub fn seed(&mut self, table: &str, key: &str, mapping: HashMap<String, String>) {
        let full = self.full_key(table, key);
        self.tables.insert(full, mapping);
    }

    /// Test helper: enqueues an event `next_event` will later return.
    pub fn push_event(&mut self, channel: impl Into<String>, event_name: impl Into<String>) {
        self.pending_events.push_back(StoreEvent {
            channel: channel.into(),
            event_name: event_name.into(),
        });
    }
}

impl Store for FakeStore {
    fn hget(&mut self, table: &str, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let full = self.full_key(table, key);
        Ok(self
            .tables
            .get(&full)
            .and_then(|m| m.get(field))
            .cloned())
    }

    fn hgetall(&mut self, table: &str, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let full = self.full_key(table, key);
        Ok(self.tables.get(&full).cloned().unwrap_or_default())
    }

    fn hset(
        &mut self,
        table: &str,
        key: &str,
        mapping: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let full = self.full_key(table, key);
        let entry = self.tables.entry(full).or_default();
        for (k, v) in mapping {
            entry.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn hdel(&mut self, table: &str, key: &str, fields: &[&str]) -> Result<(), StoreError> {
        let full = self.full_key(table, key);
        if let Some(entry) = self.tables.get_mut(&full) {
            for f in fields {
                entry.remove(*f);
            }
        }
        Ok(())
    }

    fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .tables
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn psubscribe(&mut self, _patterns: &[&str]) -> Result<(), StoreError> {
        Ok(())
    }

    fn next_event(&mut self, _timeout: Duration) -> Result<Option<StoreEvent>, StoreError> {
        Ok(self.pending_events.pop_front())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hset_preserves_unrelated_fields_on_hdel() {
        let mut store = FakeStore::new();
        let mut mapping = HashMap::new();
        mapping.insert("baud_rate".to_string(), "9600".to_string());
        mapping.insert("oper_state".to_string(), "up".to_string());
        store.hset("CONSOLE_PORT", "1", &mapping).unwrap();

        store.hdel("CONSOLE_PORT", "1", &["oper_state"]).unwrap();

        assert_eq!(
            store.hget("CONSOLE_PORT", "1", "baud_rate").unwrap(),
            Some("9600".to_string())
        );
        assert_eq!(store.hget("CONSOLE_PORT", "1", "oper_state").unwrap(), None);
    }

    #[test]
    fn keys_matches_prefix_pattern() {
        let mut store = FakeStore::new();
        store.seed("CONSOLE_PORT", "1", HashMap::new());
        store.seed("CONSOLE_PORT", "2", HashMap::new());
        store.seed("CONSOLE_SWITCH", "console_mgmt", HashMap::new());

        let mut keys = store.keys("CONSOLE_PORT|*").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["CONSOLE_PORT|1", "CONSOLE_PORT|2"]);
    }
}
