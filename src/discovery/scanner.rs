//! Scanner trait definition.
//!
//! The host enumerates installable units and hands back their raw headers.

use crate::core::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Raw header dictionary for one module, as parsed by the host.
pub type RawHeaders = HashMap<String, String>;

/// Scan output: source reference -> raw headers.
pub type ScanResult = BTreeMap<String, RawHeaders>;

/// Host discovery mechanism.
pub trait ModuleScanner: Send + Sync {
    /// Make the scanner aware of additional header fields.
    ///
    /// Called once when the manager is constructed.
    fn register_headers(&self, _headers: &[&str]) {}

    /// Enumerate modules under `dir`.
    ///
    /// Keys are source references relative to `dir`.
    fn scan(&self, dir: &Path) -> Result<ScanResult>;
}

/// Scanner backed by a fixed, replaceable set of entries.
///
/// Useful for hosts that compile their modules in and for tests.
#[derive(Default)]
pub struct StaticScanner {
    entries: RwLock<ScanResult>,
    registered: RwLock<Vec<String>>,
    scans: AtomicUsize,
}

impl StaticScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a module entry.
    pub fn with_module<I, K, V>(self, source: &str, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.insert(source, headers);
        self
    }

    /// Insert or replace a module entry.
    pub fn insert<I, K, V>(&self, source: &str, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.entries
            .write()
            .unwrap()
            .insert(source.to_string(), headers);
    }

    /// Remove a module entry.
    pub fn remove(&self, source: &str) -> bool {
        self.entries.write().unwrap().remove(source).is_some()
    }

    /// Number of times `scan` has run.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Header fields registered so far.
    pub fn registered_headers(&self) -> Vec<String> {
        self.registered.read().unwrap().clone()
    }
}

impl ModuleScanner for StaticScanner {
    fn register_headers(&self, headers: &[&str]) {
        let mut registered = self.registered.write().unwrap();
        for header in headers {
            if !registered.iter().any(|h| h == header) {
                registered.push(header.to_string());
            }
        }
    }

    fn scan(&self, _dir: &Path) -> Result<ScanResult> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.read().unwrap().clone())
    }
}
