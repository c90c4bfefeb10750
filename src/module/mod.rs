//! Module Registry
//!
//! Discoverable extension units:
//! - Canonical metadata records
//! - Metadata cache
//! - Module interface
//! - Instance registry

pub mod cache;
pub mod instances;
pub mod interface;
pub mod record;

pub use cache::{MetadataCache, ModuleCatalog};
pub use instances::{DirectoryLoader, InstanceRegistry, LoadInfo, LoadState, ModuleLoader};
pub use interface::{InertModule, ManagerHandle, Module, ModuleFactory, ModuleInit};
pub use record::{ModuleContext, ModuleRecord};
