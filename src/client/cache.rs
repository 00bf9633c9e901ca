use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Cached GET responses keyed by path. Cleared after a login so the new
/// session never sees the previous user's data.
#[derive(Debug, Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn insert(&self, path: &str, value: Value) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), value);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
