//! Canonical module metadata.
//!
//! Normalizes the raw header dictionary reported by the scanner into a
//! `ModuleRecord` with defaults applied.

use crate::core::{Fingerprint, Result};
use crate::discovery::{
    RawHeaders, HEADER_CATEGORY, HEADER_CLASS_NAME, HEADER_CONTEXT, HEADER_ID, HEADER_LAZY_INIT,
    HEADER_PRIORITY,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default category for modules that don't declare one.
pub const DEFAULT_CATEGORY: &str = "other";

/// Context tag that matches every load pass.
pub const CONTEXT_ALL: &str = "all";

/// Execution phase a module should be bulk-loaded in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleContext {
    /// Loaded in every context
    All,
    /// Loaded only when the named context is requested
    Named(String),
}

impl ModuleContext {
    /// Whether a bulk load for `requested` should include this module.
    ///
    /// An empty request only matches `All`.
    pub fn matches(&self, requested: &str) -> bool {
        match self {
            ModuleContext::All => true,
            ModuleContext::Named(name) => !requested.is_empty() && name == requested,
        }
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        ModuleContext::All
    }
}

impl From<String> for ModuleContext {
    fn from(value: String) -> Self {
        if value.is_empty() || value == CONTEXT_ALL {
            ModuleContext::All
        } else {
            ModuleContext::Named(value)
        }
    }
}

impl From<&str> for ModuleContext {
    fn from(value: &str) -> Self {
        ModuleContext::from(value.to_string())
    }
}

impl From<ModuleContext> for String {
    fn from(value: ModuleContext) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleContext::All => write!(f, "{}", CONTEXT_ALL),
            ModuleContext::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Canonical metadata for one discoverable module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Unique module ID
    pub id: String,
    /// Load context
    #[serde(default)]
    pub context: ModuleContext,
    /// Category
    #[serde(default = "default_category")]
    pub category: String,
    /// Defer instantiation until first access
    #[serde(default)]
    pub lazy_init: bool,
    /// Factory name used to construct the instance
    #[serde(default)]
    pub class_name: Option<String>,
    /// Ordering hint
    #[serde(default)]
    pub priority: Option<i64>,
    /// Where the module's code lives, relative to the module directory
    #[serde(default)]
    pub source: String,
    /// Remaining raw headers (name, version, description, ...)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl ModuleRecord {
    /// Create a record with defaults for everything but the ID.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            context: ModuleContext::All,
            category: default_category(),
            lazy_init: false,
            class_name: None,
            priority: None,
            source: String::new(),
            headers: BTreeMap::new(),
        }
    }

    /// Normalize a scanner entry.
    ///
    /// The ID comes from `ModuleID` when present, otherwise from the
    /// source file name. Defaults are applied after the ID is derived.
    pub fn from_headers(source: &str, raw: &RawHeaders) -> Self {
        let id = match raw.get(HEADER_ID).map(|s| s.trim()) {
            Some(explicit) if !explicit.is_empty() => explicit.to_lowercase(),
            _ => id_from_source(source),
        };

        let field = |key: &str| {
            raw.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let context = field(HEADER_CONTEXT)
            .map(ModuleContext::from)
            .unwrap_or_default();
        let category = field(HEADER_CATEGORY).unwrap_or_else(default_category);
        let lazy_init = field(HEADER_LAZY_INIT)
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);
        let class_name = field(HEADER_CLASS_NAME);
        let priority = field(HEADER_PRIORITY).and_then(|v| v.parse::<i64>().ok());

        let headers = raw
            .iter()
            .filter(|(k, _)| !is_module_header(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            id,
            context,
            category,
            lazy_init,
            class_name,
            priority,
            source: source.to_string(),
            headers,
        }
    }

    /// Set context.
    pub fn with_context(mut self, context: impl Into<ModuleContext>) -> Self {
        self.context = context.into();
        self
    }

    /// Set category.
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Set lazy init.
    pub fn with_lazy_init(mut self, lazy: bool) -> Self {
        self.lazy_init = lazy;
        self
    }

    /// Set class name.
    pub fn with_class_name(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    /// Set source reference.
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    /// Whether the record points at any code.
    pub fn has_source(&self) -> bool {
        !self.source.is_empty()
    }

    /// Content digest over the canonical JSON form.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let bytes = serde_json::to_vec(self)?;
        Ok(Fingerprint::digest(&bytes))
    }
}

fn is_module_header(key: &str) -> bool {
    matches!(
        key,
        HEADER_ID
            | HEADER_CONTEXT
            | HEADER_CATEGORY
            | HEADER_LAZY_INIT
            | HEADER_CLASS_NAME
            | HEADER_PRIORITY
    )
}

/// `Dir/Broken-Links.rs` -> `broken-links`
fn id_from_source(source: &str) -> String {
    let path = Path::new(source);
    let stem = path
        .file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    stem.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_applied() {
        let record = ModuleRecord::from_headers("checker.rs", &raw(&[]));

        assert_eq!(record.id, "checker");
        assert_eq!(record.context, ModuleContext::All);
        assert_eq!(record.category, "other");
        assert!(!record.lazy_init);
        assert!(record.class_name.is_none());
        assert_eq!(record.source, "checker.rs");
    }

    #[test]
    fn test_explicit_id_normalized() {
        let record = ModuleRecord::from_headers("x.rs", &raw(&[("ModuleID", "  Http-Checker ")]));
        assert_eq!(record.id, "http-checker");
    }

    #[test]
    fn test_id_from_nested_source() {
        let record = ModuleRecord::from_headers("parsers/HTML-Links.rs", &raw(&[]));
        assert_eq!(record.id, "html-links");

        let record = ModuleRecord::from_headers("extras/README", &raw(&[]));
        assert_eq!(record.id, "readme");
    }

    #[test]
    fn test_empty_fields_fall_back() {
        let record = ModuleRecord::from_headers(
            "m.rs",
            &raw(&[("ModuleID", " "), ("ModuleContext", ""), ("ModuleCategory", "")]),
        );
        assert_eq!(record.id, "m");
        assert_eq!(record.context, ModuleContext::All);
        assert_eq!(record.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_lazy_init_parsing() {
        let lazy = ModuleRecord::from_headers("a.rs", &raw(&[("ModuleLazyInit", " TRUE ")]));
        assert!(lazy.lazy_init);

        let eager = ModuleRecord::from_headers("b.rs", &raw(&[("ModuleLazyInit", "yes")]));
        assert!(!eager.lazy_init);
    }

    #[test]
    fn test_full_header() {
        let record = ModuleRecord::from_headers(
            "mod_b.rs",
            &raw(&[
                ("ModuleID", "b"),
                ("ModuleContext", "admin"),
                ("ModuleCategory", "checker"),
                ("ModuleClassName", "ModB"),
                ("ModulePriority", "10"),
                ("Name", "Module B"),
            ]),
        );

        assert_eq!(record.context, ModuleContext::Named("admin".to_string()));
        assert_eq!(record.category, "checker");
        assert_eq!(record.class_name.as_deref(), Some("ModB"));
        assert_eq!(record.priority, Some(10));
        assert_eq!(record.headers.get("Name").map(String::as_str), Some("Module B"));
        assert!(!record.headers.contains_key("ModuleID"));
    }

    #[test]
    fn test_context_matching() {
        assert!(ModuleContext::All.matches(""));
        assert!(ModuleContext::All.matches("admin"));

        let admin = ModuleContext::from("admin");
        assert!(admin.matches("admin"));
        assert!(!admin.matches(""));
        assert!(!admin.matches("cron"));
    }

    #[test]
    fn test_context_serializes_as_string() {
        let record = ModuleRecord::new("a").with_context("admin");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["context"], "admin");

        let parsed: ModuleRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_sparse_record_deserializes() {
        let parsed: ModuleRecord = serde_json::from_str(r#"{"id":"legacy"}"#).unwrap();
        assert_eq!(parsed.category, "other");
        assert_eq!(parsed.context, ModuleContext::All);
        assert!(!parsed.has_source());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let old = ModuleRecord::new("c").with_category("old");
        let new = ModuleRecord::new("c").with_category("new");

        assert_eq!(old.fingerprint().unwrap(), old.clone().fingerprint().unwrap());
        assert_ne!(old.fingerprint().unwrap(), new.fingerprint().unwrap());
    }
}
