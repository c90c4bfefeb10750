//! Instance registry.
//!
//! Tracks, per module ID, whether its code has been loaded and whether an
//! instance has been constructed. Both transitions happen at most once for
//! the lifetime of the registry, even when several threads ask for the
//! same module at once.

use crate::core::{now, Error, Result, Timestamp};
use crate::module::interface::{ManagerHandle, Module, ModuleFactory, ModuleInit};
use crate::module::record::ModuleRecord;
use crate::store::ConfigStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Per-module load state. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LoadState {
    /// Code not loaded
    NotLoaded,
    /// Code loaded, no instance
    Loaded,
    /// Instance constructed
    Instantiated,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::NotLoaded => write!(f, "not_loaded"),
            LoadState::Loaded => write!(f, "loaded"),
            LoadState::Instantiated => write!(f, "instantiated"),
        }
    }
}

/// Load bookkeeping for one module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadInfo {
    /// Current state
    pub state: LoadState,
    /// When the code was loaded
    pub loaded_at: Option<Timestamp>,
    /// When the instance was constructed
    pub instantiated_at: Option<Timestamp>,
}

/// Loads a module's code into the process.
///
/// Called at most once per module ID on success. A failed load may be
/// retried later, so implementations must tolerate running again after
/// partially completing.
pub trait ModuleLoader: Send + Sync {
    /// Load the code behind `record`.
    fn load(&self, module_id: &str, record: &ModuleRecord) -> Result<()>;
}

/// Loader that resolves source references against a directory.
///
/// Code is linked into the host; "loading" verifies the module's source
/// is still installed.
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    /// Create a loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ModuleLoader for DirectoryLoader {
    fn load(&self, module_id: &str, record: &ModuleRecord) -> Result<()> {
        let path = self.root.join(&record.source);
        if path.is_file() {
            Ok(())
        } else {
            Err(Error::load_failed(
                module_id,
                format!("{} does not exist", path.display()),
            ))
        }
    }
}

/// Per-ID in-progress markers.
///
/// A thread that finds another thread working on the same ID waits for it
/// to finish. Only the marker is held across the call-out, so work on other
/// IDs proceeds freely.
#[derive(Default)]
struct InFlight {
    owners: Mutex<HashMap<String, ThreadId>>,
    done: Condvar,
}

enum Claim<'a> {
    Owned(InFlightGuard<'a>),
    /// The calling thread is already working on this ID further up its stack.
    Reentrant,
}

impl InFlight {
    fn claim(&self, module_id: &str) -> Claim<'_> {
        let me = thread::current().id();
        let mut owners = self.owners.lock().unwrap();
        loop {
            match owners.get(module_id).copied() {
                None => break,
                Some(owner) if owner == me => return Claim::Reentrant,
                Some(_) => owners = self.done.wait(owners).unwrap(),
            }
        }
        owners.insert(module_id.to_string(), me);
        Claim::Owned(InFlightGuard {
            flight: self,
            module_id: module_id.to_string(),
        })
    }
}

struct InFlightGuard<'a> {
    flight: &'a InFlight,
    module_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // Release even if a loader or factory panicked while holding the claim.
        self.flight
            .owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.module_id);
        self.flight.done.notify_all();
    }
}

/// Registry of loaded modules and their instances.
pub struct InstanceRegistry {
    /// Code loader
    loader: Arc<dyn ModuleLoader>,
    /// Factories keyed by class name
    factories: RwLock<HashMap<String, Arc<ModuleFactory>>>,
    /// Load bookkeeping
    entries: RwLock<HashMap<String, LoadInfo>>,
    /// Constructed instances
    instances: RwLock<HashMap<String, Arc<dyn Module>>>,
    /// Loads in progress
    loading: InFlight,
    /// Constructions in progress
    constructing: InFlight,
    /// Handed to every constructed module
    config: Arc<dyn ConfigStore>,
    /// Handed to every constructed module
    manager: ManagerHandle,
}

impl InstanceRegistry {
    /// Create a new registry.
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        config: Arc<dyn ConfigStore>,
        manager: ManagerHandle,
    ) -> Self {
        Self {
            loader,
            factories: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            loading: InFlight::default(),
            constructing: InFlight::default(),
            config,
            manager,
        }
    }

    /// Register a factory under a class name. Replaces any previous one.
    pub fn register_factory(&self, class_name: &str, factory: ModuleFactory) {
        self.factories
            .write()
            .unwrap()
            .insert(class_name.to_string(), Arc::new(factory));
    }

    /// Whether a factory exists for `class_name`.
    pub fn has_factory(&self, class_name: &str) -> bool {
        self.factories.read().unwrap().contains_key(class_name)
    }

    /// Load a module's code once.
    ///
    /// Returns false for a missing record, a record without a source
    /// reference, or a failed load.
    pub fn ensure_loaded(&self, module_id: &str, record: Option<&ModuleRecord>) -> bool {
        if self.is_loaded(module_id) {
            return true;
        }

        let record = match record {
            Some(record) => record,
            None => {
                debug!(module_id = %module_id, "No record, cannot load");
                return false;
            }
        };
        if !record.has_source() {
            debug!(module_id = %module_id, "Record has no source reference");
            return false;
        }

        let _claim = match self.loading.claim(module_id) {
            Claim::Owned(guard) => guard,
            Claim::Reentrant => {
                warn!(module_id = %module_id, "Module load re-entered itself");
                return false;
            }
        };
        // Another thread may have finished the load while we waited.
        if self.is_loaded(module_id) {
            return true;
        }

        if let Err(e) = self.loader.load(module_id, record) {
            warn!(module_id = %module_id, error = %e, "Module load failed");
            return false;
        }

        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(module_id.to_string()).or_insert(LoadInfo {
            state: LoadState::NotLoaded,
            loaded_at: None,
            instantiated_at: None,
        });
        if entry.state == LoadState::NotLoaded {
            entry.state = LoadState::Loaded;
            entry.loaded_at = Some(now());
        }
        debug!(module_id = %module_id, source = %record.source, "Module loaded");
        true
    }

    /// Construct the module's instance once.
    ///
    /// Returns the existing instance when there is one, and `None` when the
    /// record names no class, no factory is registered for it, or the
    /// factory asks for its own module while constructing it.
    pub fn ensure_instantiated(
        &self,
        module_id: &str,
        record: Option<&ModuleRecord>,
    ) -> Option<Arc<dyn Module>> {
        if let Some(instance) = self.instance(module_id) {
            return Some(instance);
        }

        let record = record?;
        let class_name = record.class_name.as_deref()?;
        let factory = match self.factories.read().unwrap().get(class_name) {
            Some(factory) => Arc::clone(factory),
            None => {
                warn!(module_id = %module_id, class_name = %class_name, "No factory for module class");
                return None;
            }
        };

        let _claim = match self.constructing.claim(module_id) {
            Claim::Owned(guard) => guard,
            Claim::Reentrant => {
                debug!(module_id = %module_id, "Module requested during its own construction");
                return None;
            }
        };
        if let Some(instance) = self.instance(module_id) {
            return Some(instance);
        }

        // Only the per-ID claim is held: the factory may call back into the
        // manager for other modules.
        let init = ModuleInit {
            id: module_id.to_string(),
            record: record.clone(),
            config: Arc::clone(&self.config),
            manager: self.manager.clone(),
        };
        let built = match factory(init) {
            Ok(instance) => instance,
            Err(e) => {
                warn!(module_id = %module_id, error = %e, "Module construction failed");
                return None;
            }
        };

        self.instances
            .write()
            .unwrap()
            .insert(module_id.to_string(), Arc::clone(&built));

        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(module_id.to_string()).or_insert(LoadInfo {
            state: LoadState::NotLoaded,
            loaded_at: None,
            instantiated_at: None,
        });
        if entry.state != LoadState::Instantiated {
            entry.state = LoadState::Instantiated;
            entry.instantiated_at = Some(now());
        }
        debug!(module_id = %module_id, class_name = %class_name, "Module instantiated");

        Some(built)
    }

    /// Existing instance, if any.
    pub fn instance(&self, module_id: &str) -> Option<Arc<dyn Module>> {
        self.instances.read().unwrap().get(module_id).cloned()
    }

    /// Whether the module's code has been loaded.
    pub fn is_loaded(&self, module_id: &str) -> bool {
        self.load_state(module_id) != LoadState::NotLoaded
    }

    /// Current load state.
    pub fn load_state(&self, module_id: &str) -> LoadState {
        self.entries
            .read()
            .unwrap()
            .get(module_id)
            .map(|e| e.state)
            .unwrap_or(LoadState::NotLoaded)
    }

    /// Load bookkeeping for a module that has been touched.
    pub fn load_info(&self, module_id: &str) -> Option<LoadInfo> {
        self.entries.read().unwrap().get(module_id).cloned()
    }

    /// IDs of every loaded module.
    pub fn loaded_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.state != LoadState::NotLoaded)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
