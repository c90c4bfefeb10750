//! Active-set store.
//!
//! The persisted `id -> ModuleRecord` map of enabled modules. Every
//! mutation is written through to the config store before returning.

use crate::core::{Error, Result};
use crate::module::{MetadataCache, ModuleRecord};
use crate::store::config::ConfigStore;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Active modules indexed by ID, each with the record captured when it
/// was activated (or last refreshed).
pub type ActiveSet = BTreeMap<String, ModuleRecord>;

/// Durable view of which modules are active.
pub struct ActiveSetStore {
    store: Arc<dyn ConfigStore>,
    key: String,
    defaults: Option<Vec<String>>,
}

impl ActiveSetStore {
    /// Create a store over the `key` option of `store`.
    ///
    /// `defaults` seeds the set the first time it is read, if nothing has
    /// been persisted yet.
    pub fn new(store: Arc<dyn ConfigStore>, key: &str, defaults: Option<Vec<String>>) -> Self {
        Self {
            store,
            key: key.to_string(),
            defaults,
        }
    }

    /// Current active set, bootstrapping it from the defaults on first use.
    pub fn active(&self, cache: &MetadataCache) -> Result<ActiveSet> {
        if let Some(active) = self.persisted()? {
            return Ok(active);
        }

        let catalog = cache.discover()?;
        let active: ActiveSet = self
            .defaults
            .iter()
            .flatten()
            .filter_map(|id| catalog.get(id).map(|record| (id.clone(), record.clone())))
            .collect();

        self.replace(&active)?;
        let ids: Vec<&String> = active.keys().collect();
        info!(modules = ?ids, "Initialized active modules from defaults");
        Ok(active)
    }

    /// Persisted active set, or `None` if it has never been written.
    pub fn persisted(&self) -> Result<Option<ActiveSet>> {
        let value = match self.store.option(&self.key) {
            Some(value) => value,
            None => return Ok(None),
        };
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(None),
            _ => {
                return Err(Error::CorruptActiveSet(format!(
                    "option {} is not an object",
                    self.key
                )))
            }
        };

        let active = map
            .into_iter()
            .map(|(id, raw)| {
                let record = serde_json::from_value::<ModuleRecord>(raw).unwrap_or_else(|e| {
                    warn!(module_id = %id, error = %e, "Unreadable active record, keeping ID only");
                    ModuleRecord::new(&id)
                });
                (id, record)
            })
            .collect();
        Ok(Some(active))
    }

    /// Whether `module_id` is in the persisted set.
    ///
    /// False when no set has been persisted.
    pub fn is_active(&self, module_id: &str) -> bool {
        self.store
            .option(&self.key)
            .as_ref()
            .and_then(Value::as_object)
            .map(|map| map.contains_key(module_id))
            .unwrap_or(false)
    }

    /// Record `module_id` as active.
    pub fn set_record(&self, module_id: &str, record: &ModuleRecord) -> Result<()> {
        let previous = self.store.option(&self.key);
        let mut map = as_map(previous.clone());
        map.insert(module_id.to_string(), serde_json::to_value(record)?);
        self.write_through(previous, Value::Object(map))
    }

    /// Remove `module_id` from the active set.
    pub fn remove_record(&self, module_id: &str) -> Result<()> {
        let previous = self.store.option(&self.key);
        let mut map = as_map(previous.clone());
        map.remove(module_id);
        self.write_through(previous, Value::Object(map))
    }

    /// Overwrite the whole set.
    pub fn replace(&self, active: &ActiveSet) -> Result<()> {
        let previous = self.store.option(&self.key);
        let mut map = Map::new();
        for (id, record) in active {
            map.insert(id.clone(), serde_json::to_value(record)?);
        }
        self.write_through(previous, Value::Object(map))
    }

    /// Option key the set is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Apply `next` and flush; on a failed flush, put `previous` back.
    fn write_through(&self, previous: Option<Value>, next: Value) -> Result<()> {
        self.store.set_option(&self.key, next);
        if let Err(e) = self.store.save() {
            match previous {
                Some(value) => self.store.set_option(&self.key, value),
                None => {
                    self.store.remove_option(&self.key);
                }
            }
            warn!(key = %self.key, error = %e, "Failed to persist active modules");
            return Err(match e {
                Error::Persistence(_) => e,
                other => Error::Persistence(other.to_string()),
            });
        }
        Ok(())
    }
}

fn as_map(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
