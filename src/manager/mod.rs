//! Manager Module
//!
//! Module lifecycle control:
//! - Manager configuration
//! - Activation, deactivation and bulk loading

pub mod config;
pub mod lifecycle;


pub use config::{ManagerConfig, DEFAULT_ACTIVE_MODULES_KEY};
pub use lifecycle::{ModuleManager, ModuleManagerBuilder};
