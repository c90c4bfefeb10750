//! Lifecycle controller.
//!
//! Orchestrates discovery, the persisted active set and the instance
//! registry. All operations are synchronous; callers serialize mutations.

use crate::core::Result;
use crate::discovery::{ModuleScanner, MODULE_HEADERS};
use crate::manager::config::ManagerConfig;
use crate::module::{
    DirectoryLoader, InstanceRegistry, LoadInfo, LoadState, ManagerHandle, MetadataCache, Module,
    ModuleCatalog, ModuleFactory, ModuleLoader, ModuleRecord,
};
use crate::store::{ActiveSet, ActiveSetStore, ConfigStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Module manager.
///
/// Exactly one should exist per host process; the host's composition root
/// builds it and hands the `Arc` to whoever needs it.
pub struct ModuleManager {
    /// Configuration
    config: ManagerConfig,
    /// Shared configuration store
    store: Arc<dyn ConfigStore>,
    /// Discovery cache
    catalog: MetadataCache,
    /// Persisted active set
    active: ActiveSetStore,
    /// Loaded modules and instances
    instances: InstanceRegistry,
}

/// Builder for `ModuleManager`.
pub struct ModuleManagerBuilder {
    config: ManagerConfig,
    store: Arc<dyn ConfigStore>,
    scanner: Arc<dyn ModuleScanner>,
    loader: Option<Arc<dyn ModuleLoader>>,
    factories: Vec<(String, ModuleFactory)>,
}

impl ModuleManagerBuilder {
    /// Replace the configuration.
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the modules active on first run.
    pub fn default_active<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.with_default_active(ids);
        self
    }

    /// Use a custom loader instead of `DirectoryLoader`.
    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Register a factory for a class name.
    pub fn factory(mut self, class_name: &str, factory: ModuleFactory) -> Self {
        self.factories.push((class_name.to_string(), factory));
        self
    }

    /// Build the manager.
    ///
    /// Registers the module header fields with the scanner.
    pub fn build(self) -> Arc<ModuleManager> {
        let ModuleManagerBuilder {
            config,
            store,
            scanner,
            loader,
            factories,
        } = self;

        scanner.register_headers(&MODULE_HEADERS);
        let loader = loader.unwrap_or_else(|| {
            Arc::new(DirectoryLoader::new(config.module_dir.clone())) as Arc<dyn ModuleLoader>
        });

        Arc::new_cyclic(|weak| {
            let instances =
                InstanceRegistry::new(loader, Arc::clone(&store), ManagerHandle::new(weak.clone()));
            for (class_name, factory) in factories {
                instances.register_factory(&class_name, factory);
            }

            ModuleManager {
                catalog: MetadataCache::new(scanner, config.module_dir.clone()),
                active: ActiveSetStore::new(
                    Arc::clone(&store),
                    &config.active_modules_key,
                    config.default_active_modules.clone(),
                ),
                instances,
                store,
                config,
            }
        })
    }
}

impl ModuleManager {
    /// Start building a manager over a config store and a scanner.
    pub fn builder(
        store: Arc<dyn ConfigStore>,
        scanner: Arc<dyn ModuleScanner>,
    ) -> ModuleManagerBuilder {
        ModuleManagerBuilder {
            config: ManagerConfig::default(),
            store,
            scanner,
            loader: None,
            factories: Vec::new(),
        }
    }

    /// Register a factory after construction.
    pub fn register_factory(&self, class_name: &str, factory: ModuleFactory) {
        self.instances.register_factory(class_name, factory);
    }

    // ==================== Queries ====================

    /// Every discoverable module. Scans only on first use.
    pub fn get_modules(&self) -> Result<Arc<ModuleCatalog>> {
        self.catalog.discover()
    }

    /// Discovered record for one module.
    pub fn module_data(&self, module_id: &str) -> Result<Option<ModuleRecord>> {
        self.catalog.record(module_id)
    }

    /// Active modules, bootstrapping from the configured defaults on first use.
    pub fn get_active_modules(&self) -> Result<ActiveSet> {
        self.active.active(&self.catalog)
    }

    /// Whether a module is recorded as active.
    pub fn is_active(&self, module_id: &str) -> bool {
        self.active.is_active(module_id)
    }

    /// Load state of a module.
    pub fn load_state(&self, module_id: &str) -> LoadState {
        self.instances.load_state(module_id)
    }

    /// Load bookkeeping of a module.
    pub fn load_info(&self, module_id: &str) -> Option<LoadInfo> {
        self.instances.load_info(module_id)
    }

    /// Manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Shared configuration store.
    pub fn store(&self) -> Arc<dyn ConfigStore> {
        Arc::clone(&self.store)
    }

    /// Instance of an active module, loading and constructing it on demand.
    pub fn get_module(&self, module_id: &str) -> Option<Arc<dyn Module>> {
        self.get_module_with(module_id, true, "")
    }

    /// Instance of a module.
    ///
    /// An unloaded module is loaded only if `autoload` is set and the
    /// module is active. A non-empty `category` restricts the result to
    /// modules of that category.
    pub fn get_module_with(
        &self,
        module_id: &str,
        autoload: bool,
        category: &str,
    ) -> Option<Arc<dyn Module>> {
        // Inactive, unloaded modules return before any discovery.
        let mut record = None;
        if !category.is_empty() {
            record = self.known_record(module_id);
            match &record {
                Some(r) if r.category == category => {}
                _ => return None,
            }
        }

        if !self.instances.is_loaded(module_id) {
            if !(autoload && self.is_active(module_id)) {
                return None;
            }
            if !self.load_module(module_id, record.clone()) {
                return None;
            }
        }

        if let Some(instance) = self.instances.instance(module_id) {
            return Some(instance);
        }
        let record = record.or_else(|| self.known_record(module_id));
        self.instances.ensure_instantiated(module_id, record.as_ref())
    }

    // ==================== Activation ====================

    /// Activate a module.
    ///
    /// Returns `Ok(true)` if the module is (now) active and `Ok(false)` if
    /// it is unknown or fails to load, in which case nothing is recorded.
    /// Persistence failures are returned as errors.
    pub fn activate(&self, module_id: &str) -> Result<bool> {
        if self.is_active(module_id) {
            debug!(module_id = %module_id, "Module already active");
            return Ok(true);
        }

        let record = match self.catalog.record(module_id)? {
            Some(record) => record,
            None => {
                warn!(module_id = %module_id, "Cannot activate unknown module");
                return Ok(false);
            }
        };

        if !self.load_module(module_id, Some(record.clone())) {
            warn!(module_id = %module_id, "Module failed to load, not activated");
            return Ok(false);
        }

        self.active.set_record(module_id, &record)?;
        info!(module_id = %module_id, category = %record.category, "Module activated");

        // Lazy modules stay unconstructed; activation stands without a
        // greeting when there is no instance.
        match self.instances.instance(module_id) {
            Some(module) => module.activated(),
            None => debug!(module_id = %module_id, "No instance to notify of activation"),
        }
        Ok(true)
    }

    /// Deactivate a module.
    ///
    /// A loaded module is notified while it is still recorded as active,
    /// constructing its instance first if it is lazy. Nothing is loaded
    /// just to deliver the notice.
    pub fn deactivate(&self, module_id: &str) -> Result<bool> {
        if !self.is_active(module_id) {
            debug!(module_id = %module_id, "Module already inactive");
            return Ok(true);
        }

        if self.instances.is_loaded(module_id) {
            match self.get_module_with(module_id, false, "") {
                Some(module) => module.deactivated(),
                None => debug!(module_id = %module_id, "No instance to notify of deactivation"),
            }
        }

        self.active.remove_record(module_id)?;
        info!(module_id = %module_id, "Module deactivated");
        Ok(true)
    }

    /// Make `ids` the active set.
    ///
    /// Deactivates every active module not listed, then activates every
    /// listed module not yet active. Modules that fail to activate are
    /// skipped.
    pub fn set_active_modules<I, S>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let wanted: Vec<String> = ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let current = self.get_active_modules()?;

        let to_deactivate: Vec<&String> =
            current.keys().filter(|id| !seen.contains(*id)).collect();
        let to_activate: Vec<&String> =
            wanted.iter().filter(|id| !current.contains_key(*id)).collect();
        debug!(
            deactivate = ?to_deactivate,
            activate = ?to_activate,
            "Reconciling active modules"
        );

        for module_id in to_deactivate {
            self.deactivate(module_id)?;
        }
        for module_id in to_activate {
            if !self.activate(module_id)? {
                warn!(module_id = %module_id, "Skipped module that could not be activated");
            }
        }
        Ok(())
    }

    /// Send `activated` to every active module that has an instance.
    ///
    /// Used once, when the host application itself is installed.
    pub fn notify_plugin_activated(&self) -> Result<()> {
        let active = self.get_active_modules()?;
        let mut notified = 0usize;
        for module_id in active.keys() {
            if let Some(module) = self.get_module(module_id) {
                module.activated();
                notified += 1;
            }
        }
        info!(active = active.len(), notified, "Notified active modules");
        Ok(())
    }

    /// Re-scan modules and overwrite the stored record of every active
    /// module that is still discoverable.
    pub fn refresh_active_set(&self) -> Result<ActiveSet> {
        self.catalog.invalidate();
        let catalog = self.catalog.discover()?;
        let mut active = self.get_active_modules()?;

        let mut changed = 0usize;
        for (module_id, stored) in active.iter_mut() {
            let fresh = match catalog.get(module_id) {
                Some(fresh) => fresh,
                None => {
                    debug!(module_id = %module_id, "Active module no longer discoverable");
                    continue;
                }
            };
            let differs = match (stored.fingerprint(), fresh.fingerprint()) {
                (Ok(old), Ok(new)) => old != new,
                _ => true,
            };
            if differs {
                debug!(module_id = %module_id, "Refreshing stale active record");
                changed += 1;
            }
            *stored = fresh.clone();
        }

        self.active.replace(&active)?;
        info!(active = active.len(), changed, "Refreshed active modules");
        Ok(active)
    }

    // ==================== Loading ====================

    /// Load every active, not-yet-loaded module whose context is `all` or
    /// equals `context`. Lazy modules are loaded but not constructed.
    pub fn load_modules_for_context(&self, context: &str) -> Result<()> {
        let active = self.get_active_modules()?;
        for (module_id, record) in active {
            if self.instances.is_loaded(&module_id) {
                continue;
            }
            if !record.has_source() {
                debug!(module_id = %module_id, "Skipping active module without source");
                continue;
            }
            if record.context.matches(context) {
                self.load_module(&module_id, Some(record));
            }
        }
        Ok(())
    }

    /// Load a module and, unless it is lazy, construct it.
    fn load_module(&self, module_id: &str, record: Option<ModuleRecord>) -> bool {
        let record = record.or_else(|| self.known_record(module_id));
        if !self.instances.ensure_loaded(module_id, record.as_ref()) {
            return false;
        }

        if let Some(record) = record.as_ref().filter(|r| !r.lazy_init) {
            if self.instances.ensure_instantiated(module_id, Some(record)).is_none() {
                debug!(module_id = %module_id, "Loaded without an instance");
            }
        }
        true
    }

    /// Discovered record, falling back to the one stored in the active set.
    fn known_record(&self, module_id: &str) -> Option<ModuleRecord> {
        match self.catalog.record(module_id) {
            Ok(Some(record)) => return Some(record),
            Ok(None) => {}
            Err(e) => warn!(module_id = %module_id, error = %e, "Module discovery failed"),
        }
        self.active
            .persisted()
            .ok()
            .flatten()
            .and_then(|mut active| active.remove(module_id))
    }
}
