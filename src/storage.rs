//! Interfaces toward the cache layer.
//!
//! The engine itself knows nothing about storage; these traits are the
//! contract a protocol layer running inside coroutines codes against.
//! [`MemStorage`] is a plain map-backed implementation with no eviction,
//! enough for demos and tests.

use std::collections::HashMap;

/// Key-value backend consumed by command execution.
pub trait Storage {
    /// Insert or update. Returns `false` when the entry cannot be stored.
    fn put(&mut self, key: &str, value: &str) -> bool;

    /// Insert only if `key` is not present.
    fn put_if_absent(&mut self, key: &str, value: &str) -> bool;

    /// Update only an existing entry.
    fn set(&mut self, key: &str, value: &str) -> bool;

    /// Remove `key`. Returns `false` when it was not present.
    fn delete(&mut self, key: &str) -> bool;

    /// Current value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

/// A parsed protocol command, ready to run against a storage backend.
pub trait Command {
    fn execute(&self, storage: &mut dyn Storage, argument: &str) -> String;
}

/// `HashMap`-backed [`Storage`] without eviction.
#[derive(Debug, Default)]
pub struct MemStorage {
    entries: HashMap<String, String>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }
}

impl Storage for MemStorage {
    fn put(&mut self, key: &str, value: &str) -> bool {
        self.entries.insert(key.to_owned(), value.to_owned());
        true
    }

    fn put_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        true
    }

    fn set(&mut self, key: &str, value: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(slot) => {
                *slot = value.to_owned();
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_overwrites_and_get_reads_back() {
        let mut store = MemStorage::new();
        assert!(store.put("k", "v1"));
        assert!(store.put("k", "v2"));
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn put_if_absent_respects_existing() {
        let mut store = MemStorage::new();
        assert!(store.put_if_absent("k", "v1"));
        assert!(!store.put_if_absent("k", "v2"));
        assert_eq!(store.get("k").as_deref(), Some("v1"));
    }

    #[test]
    fn set_requires_existing() {
        let mut store = MemStorage::new();
        assert!(!store.set("k", "v"));
        store.put("k", "v");
        assert!(store.set("k", "w"));
        assert_eq!(store.get("k").as_deref(), Some("w"));
    }

    #[test]
    fn delete_reports_presence() {
        let mut store = MemStorage::new();
        store.put("k", "v");
        assert!(store.delete("k"));
        assert!(!store.delete("k"));
    }
}
