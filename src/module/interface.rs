//! Module interface definition.
//!
//! Defines the lifecycle interface modules must implement and the bundle
//! handed to a factory at construction.

use crate::core::Result;
use crate::manager::ModuleManager;
use crate::module::record::ModuleRecord;
use crate::store::ConfigStore;
use std::any::Any;
use std::sync::{Arc, Weak};

/// Module trait that all module types must implement.
pub trait Module: Send + Sync {
    /// Module ID this instance was constructed for.
    fn id(&self) -> &str;

    /// Called after the module has been recorded as active.
    fn activated(&self) {}

    /// Called while the module is still recorded as active, right before
    /// it is removed from the active set.
    fn deactivated(&self) {}

    /// Downcast support for hosts that need the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Factory that builds a module instance.
pub type ModuleFactory = Box<dyn Fn(ModuleInit) -> Result<Arc<dyn Module>> + Send + Sync>;

/// Everything a module receives at construction.
#[derive(Clone)]
pub struct ModuleInit {
    /// Module ID
    pub id: String,
    /// Record the instance is built from
    pub record: ModuleRecord,
    /// Shared configuration store
    pub config: Arc<dyn ConfigStore>,
    /// Back-reference to the owning manager
    pub manager: ManagerHandle,
}

/// Non-owning reference to the module manager.
///
/// Modules hold this instead of an `Arc` so the manager, which owns every
/// instance, is not kept alive by them.
#[derive(Clone, Default)]
pub struct ManagerHandle(Weak<ModuleManager>);

impl ManagerHandle {
    /// Wrap a weak manager reference.
    pub fn new(manager: Weak<ModuleManager>) -> Self {
        Self(manager)
    }

    /// Get the manager if it is still alive.
    pub fn get(&self) -> Option<Arc<ModuleManager>> {
        self.0.upgrade()
    }
}

impl std::fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ManagerHandle")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

/// Module with no behaviour of its own.
///
/// Handy as a placeholder factory for modules that only need to be
/// tracked as active.
pub struct InertModule {
    id: String,
}

impl InertModule {
    /// Factory building `InertModule`s.
    pub fn factory() -> ModuleFactory {
        Box::new(|init: ModuleInit| {
            Ok(Arc::new(InertModule { id: init.id }) as Arc<dyn Module>)
        })
    }
}

impl Module for InertModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
