//! Metadata cache.
//!
//! Scans once, normalizes every entry into a `ModuleRecord`, and serves
//! lookups from memory until explicitly invalidated.

use crate::core::{Error, Result};
use crate::discovery::ModuleScanner;
use crate::module::record::ModuleRecord;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Discovered modules indexed by ID.
pub type ModuleCatalog = BTreeMap<String, ModuleRecord>;

/// Process-lifetime cache of discovered module metadata.
pub struct MetadataCache {
    scanner: Arc<dyn ModuleScanner>,
    module_dir: PathBuf,
    cache: RwLock<Option<Arc<ModuleCatalog>>>,
}

impl MetadataCache {
    /// Create a cache over `scanner`, rooted at `module_dir`.
    pub fn new(scanner: Arc<dyn ModuleScanner>, module_dir: impl Into<PathBuf>) -> Self {
        Self {
            scanner,
            module_dir: module_dir.into(),
            cache: RwLock::new(None),
        }
    }

    /// All discoverable modules.
    ///
    /// Only the first successful call touches the scanner.
    pub fn discover(&self) -> Result<Arc<ModuleCatalog>> {
        if let Some(catalog) = self.cache.read().unwrap().as_ref() {
            return Ok(Arc::clone(catalog));
        }

        let scanned = self.scanner.scan(&self.module_dir).map_err(|e| match e {
            Error::Discovery(_) => e,
            other => Error::Discovery(format!("{}: {}", self.module_dir.display(), other)),
        })?;
        let mut catalog = ModuleCatalog::new();
        for (source, raw) in &scanned {
            let record = ModuleRecord::from_headers(source, raw);
            if let Some(previous) = catalog.get(&record.id) {
                debug!(
                    module_id = %record.id,
                    replaced = %previous.source,
                    source = %record.source,
                    "Duplicate module ID, last entry wins"
                );
            }
            catalog.insert(record.id.clone(), record);
        }
        debug!(count = catalog.len(), dir = %self.module_dir.display(), "Discovered modules");

        let catalog = Arc::new(catalog);
        *self.cache.write().unwrap() = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Look up a single record.
    pub fn record(&self, module_id: &str) -> Result<Option<ModuleRecord>> {
        Ok(self.discover()?.get(module_id).cloned())
    }

    /// Drop the cached catalog; the next lookup re-scans.
    pub fn invalidate(&self) {
        *self.cache.write().unwrap() = None;
    }

    /// Whether a catalog is currently cached.
    pub fn is_cached(&self) -> bool {
        self.cache.read().unwrap().is_some()
    }

    /// Directory handed to the scanner.
    pub fn module_dir(&self) -> &std::path::Path {
        &self.module_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{ScanResult, StaticScanner};
    use std::path::Path;

    fn scanner() -> Arc<StaticScanner> {
        Arc::new(
            StaticScanner::new()
                .with_module("a.rs", [("ModuleID", "a")])
                .with_module("b.rs", [("ModuleID", "b"), ("ModuleLazyInit", "true")]),
        )
    }

    #[test]
    fn test_discover_is_memoized() {
        let scanner = scanner();
        let cache = MetadataCache::new(scanner.clone(), "modules");

        let first = cache.discover().unwrap();
        let second = cache.discover().unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(scanner.scan_count(), 1);
    }

    #[test]
    fn test_record_lookup() {
        let cache = MetadataCache::new(scanner(), "modules");

        assert!(cache.record("b").unwrap().unwrap().lazy_init);
        assert!(cache.record("missing").unwrap().is_none());
    }

    #[test]
    fn test_invalidate_rescans() {
        let scanner = scanner();
        let cache = MetadataCache::new(scanner.clone(), "modules");
        cache.discover().unwrap();

        scanner.insert("c.rs", [("ModuleID", "c")]);
        assert!(cache.record("c").unwrap().is_none());

        cache.invalidate();
        assert!(!cache.is_cached());
        assert!(cache.record("c").unwrap().is_some());
        assert_eq!(scanner.scan_count(), 2);
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let scanner = StaticScanner::new()
            .with_module("one/dup.rs", [("ModuleCategory", "first")])
            .with_module("two/dup.rs", [("ModuleCategory", "second")]);
        let cache = MetadataCache::new(Arc::new(scanner), "modules");

        let catalog = cache.discover().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog["dup"].category, "second");
    }

    struct BrokenScanner;

    impl ModuleScanner for BrokenScanner {
        fn scan(&self, _dir: &Path) -> Result<ScanResult> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "unreadable",
            )))
        }
    }

    #[test]
    fn test_failed_scan_not_cached() {
        let cache = MetadataCache::new(Arc::new(BrokenScanner), "modules");
        assert!(matches!(cache.discover(), Err(Error::Discovery(_))));
        assert!(!cache.is_cached());
    }
}
