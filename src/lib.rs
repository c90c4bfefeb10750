//! # modkit - Plugin Module Registry
//!
//! Discovers self-contained extension modules and manages their lifecycle:
//! - **Discovery**: normalizes scanner headers into cached `ModuleRecord`s
//! - **Active set**: durable list of enabled modules in the host's config store
//! - **Instances**: at-most-once loading and construction per module
//! - **Lifecycle**: activation, deactivation and context-scoped bulk loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modkit::discovery::StaticScanner;
//! use modkit::module::InertModule;
//! use modkit::store::JsonFileStore;
//! use modkit::{ManagerConfig, ModuleManager};
//! use std::sync::Arc;
//!
//! fn main() -> modkit::Result<()> {
//!     let store = Arc::new(JsonFileStore::open("options.json")?);
//!     let scanner = Arc::new(StaticScanner::new().with_module(
//!         "link-checker.rs",
//!         [("ModuleClassName", "Inert")],
//!     ));
//!
//!     let manager = ModuleManager::builder(store, scanner)
//!         .config(ManagerConfig::new("modules").with_default_active(["link-checker"]))
//!         .factory("Inert", InertModule::factory())
//!         .build();
//!
//!     manager.load_modules_for_context("")?;
//!     manager.activate("link-checker")?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod discovery;
pub mod manager;
pub mod module;
pub mod store;

pub use crate::core::error::{Error, Result};
pub use manager::{ManagerConfig, ModuleManager};
pub use module::{LoadState, Module, ModuleRecord};
pub use store::{ActiveSet, ConfigStore};
