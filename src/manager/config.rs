//! Module manager configuration.

use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Option key the active set is persisted under.
pub const DEFAULT_ACTIVE_MODULES_KEY: &str = "active_modules";

/// Module manager configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory handed to the scanner and the default loader
    pub module_dir: PathBuf,
    /// Modules active on first run. `None` starts with nothing active.
    pub default_active_modules: Option<Vec<String>>,
    /// Config store key holding the active set
    pub active_modules_key: String,
}

impl ManagerConfig {
    /// Create a config for `module_dir`.
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
            ..Default::default()
        }
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the modules active on first run.
    pub fn with_default_active<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_active_modules = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the active-set option key.
    pub fn with_active_modules_key(mut self, key: &str) -> Self {
        self.active_modules_key = key.to_string();
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            module_dir: PathBuf::from("modules"),
            default_active_modules: None,
            active_modules_key: DEFAULT_ACTIVE_MODULES_KEY.to_string(),
        }
    }
}
