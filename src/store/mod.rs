//! Store Module
//!
//! Persistence seams:
//! - Configuration store trait (memory, JSON file)
//! - Active-set store

pub mod active;
pub mod config;
pub mod file;

pub use active::{ActiveSet, ActiveSetStore};
pub use config::{ConfigStore, MemoryConfigStore};
pub use file::JsonFileStore;
