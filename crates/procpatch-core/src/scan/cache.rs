use std::collections::HashMap;

/// Resolved signature addresses for one attach session, keyed by patch name.
///
/// Addresses are only meaningful for the process they were scanned in, so
/// the cache lives and dies with the session.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: HashMap<String, u64>,
    scans: usize,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, address: u64) {
        self.entries.insert(name.to_string(), address);
    }

    pub fn remove(&mut self, name: &str) -> Option<u64> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count a module scan performed on behalf of this cache
    pub fn record_scan(&mut self) {
        self.scans += 1;
    }

    /// Number of module scans performed this session
    pub fn scans(&self) -> usize {
        self.scans
    }
}
