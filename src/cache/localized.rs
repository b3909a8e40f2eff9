use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Supplier of translated display strings (for example the label of the
/// missing-artist placeholder). `version` changes whenever translations do.
pub trait StringSource: Send + Sync {
    fn version(&self) -> i64;
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Translated strings keyed by string key and by the source version they
/// were read at. A lookup with a newer version evicts only that key.
#[derive(Default)]
pub struct LocalizedStringCache {
    entries: Mutex<HashMap<String, (i64, String)>>,
}

impl LocalizedStringCache {
    pub fn get(&self, key: &str, updated_at: i64) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((version, value)) if *version == updated_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, updated_at: i64, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (updated_at, value.to_string()));
    }

    /// Read-through lookup against `source`.
    pub fn resolve(&self, source: &dyn StringSource, key: &str) -> Option<String> {
        let version = source.version();
        if let Some(value) = self.get(key, version) {
            return Some(value);
        }
        let value = source.lookup(key)?;
        self.insert(key, version, &value);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
