//! JSON file store.
//!
//! Options live in a single JSON object on disk.

use crate::core::{Error, Result};
use crate::store::config::ConfigStore;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Config store persisted as a JSON file.
///
/// `save` writes a sibling temp file and renames it over the target, so a
/// crash mid-write leaves the previous contents intact.
pub struct JsonFileStore {
    path: PathBuf,
    options: RwLock<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file means no options yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let options = if path.exists() {
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => map,
                other => {
                    return Err(Error::Persistence(format!(
                        "{} holds {} instead of an object",
                        path.display(),
                        kind(&other)
                    )))
                }
            }
        } else {
            Map::new()
        };
        debug!(path = %path.display(), options = options.len(), "Opened config file");

        Ok(Self {
            path,
            options: RwLock::new(options),
        })
    }

    /// File backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, bytes: &[u8]) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "options".to_string());
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl ConfigStore for JsonFileStore {
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
        let bytes = {
            let options = self.options.read().unwrap();
            serde_json::to_vec_pretty(&*options)?
        };
        self.write_atomically(&bytes)
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Saved config file");
        Ok(())
    }
}
