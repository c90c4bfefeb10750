//! ConfigStore trait definition.
//!
//! The host's key-value configuration object. modkit owns one key in it
//! (the active set); everything else belongs to the host and its modules.

use crate::core::Result;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Key-value configuration store with an explicit durable flush.
pub trait ConfigStore: Send + Sync {
    /// Read an option.
    fn option(&self, key: &str) -> Option<Value>;

    /// Set an option in memory. Not durable until `save`.
    fn set_option(&self, key: &str, value: Value);

    /// Remove an option in memory, returning the old value.
    fn remove_option(&self, key: &str) -> Option<Value>;

    /// Durably flush all options.
    fn save(&self) -> Result<()>;
}

/// In-process store.
///
/// `save` snapshots the live options, so `persisted` shows exactly what a
/// durable store would hold.
#[derive(Default)]
pub struct MemoryConfigStore {
    options: RwLock<Map<String, Value>>,
    persisted: RwLock<Map<String, Value>>,
    saves: AtomicUsize,
}

impl MemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with options, as if previously saved.
    pub fn with_options(options: Map<String, Value>) -> Self {
        Self {
            persisted: RwLock::new(options.clone()),
            options: RwLock::new(options),
            saves: AtomicUsize::new(0),
        }
    }

    /// Options as of the last `save`.
    pub fn persisted(&self) -> Map<String, Value> {
        self.persisted.read().unwrap().clone()
    }

    /// Number of `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn option(&self, key: &str) -> Option<Value> {
        self.options.read().unwrap().get(key).cloned()
    }

    fn set_option(&self, key: &str, value: Value) {
        self.options.write().unwrap().insert(key.to_string(), value);
    }

    fn remove_option(&self, key: &str) -> Option<Value> {
        self.options.write().unwrap().remove(key)
    }

    fn save(&self) -> Result<()> {
        let snapshot = self.options.read().unwrap().clone();
        *self.persisted.write().unwrap() = snapshot;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let store = MemoryConfigStore::new();
        store.set_option("check_threshold", json!(72));

        assert_eq!(store.option("check_threshold"), Some(json!(72)));
        store.set_option("check_threshold", json!(90));
        assert_eq!(store.option("check_threshold"), Some(json!(90)));
        assert!(store.option("missing").is_none());
    }

    #[test]
    fn test_save_snapshots() {
        let store = MemoryConfigStore::new();
        store.set_option("a", json!(1));
        assert!(store.persisted().is_empty());

        store.save().unwrap();
        store.set_option("b", json!(2));

        assert_eq!(store.persisted().len(), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_remove() {
        let mut initial = Map::new();
        initial.insert("a".to_string(), json!(true));
        let store = MemoryConfigStore::with_options(initial);

        assert_eq!(store.remove_option("a"), Some(json!(true)));
        assert!(store.remove_option("a").is_none());
        assert_eq!(store.persisted().len(), 1);
    }
}
