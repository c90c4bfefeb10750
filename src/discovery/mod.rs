//! Discovery Module
//!
//! Boundary to the host's plugin-discovery mechanism:
//! - Recognized module header names
//! - `ModuleScanner` trait
//! - In-memory scanner

pub mod scanner;

pub use scanner::{ModuleScanner, RawHeaders, ScanResult, StaticScanner};

/// Explicit module identifier.
pub const HEADER_ID: &str = "ModuleID";
/// Load context tag.
pub const HEADER_CONTEXT: &str = "ModuleContext";
/// Category used for grouping.
pub const HEADER_CATEGORY: &str = "ModuleCategory";
/// `"true"` defers instantiation until first access.
pub const HEADER_LAZY_INIT: &str = "ModuleLazyInit";
/// Name of the type to instantiate.
pub const HEADER_CLASS_NAME: &str = "ModuleClassName";
/// Ordering hint.
pub const HEADER_PRIORITY: &str = "ModulePriority";

/// Header fields registered with the scanner at manager construction.
pub const MODULE_HEADERS: [&str; 6] = [
    HEADER_ID,
    HEADER_CATEGORY,
    HEADER_CONTEXT,
    HEADER_LAZY_INIT,
    HEADER_CLASS_NAME,
    HEADER_PRIORITY,
];
