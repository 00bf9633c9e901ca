use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::{SessionStore, StorageChange, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-process store, the equivalent of a tab's `localStorage`.
pub struct MemorySessionStore {
    items: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            items: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map; keep serving it.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value,
        });
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let previous = self.items().insert(key.to_string(), value.to_string());
        if previous.as_deref() != Some(value) {
            self.notify(key, Some(value.to_string()));
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        if self.items().remove(key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

/// Store backed by one file per key under a directory. Used by the CLI so a
/// login survives between invocations.
pub struct FileSessionStore {
    dir: PathBuf,
    changes: broadcast::Sender<StorageChange>,
}

impl FileSessionStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { dir, changes })
    }

    /// `$ISO_HUB_SESSION_DIR`, or `~/.config/iso-hub/session`.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        if let Ok(custom_dir) = std::env::var("ISO_HUB_SESSION_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }
        let home = std::env::var("HOME").map_err(|_| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME environment variable not set",
            ))
        })?;
        Ok(PathBuf::from(home).join(".config").join("iso-hub").join("session"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl SessionStore for FileSessionStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let previous = self.get_item(key)?;
        fs::write(path, value)?;
        if previous.as_deref() != Some(value) {
            let _ = self.changes.send(StorageChange {
                key: key.to_string(),
                new_value: Some(value.to_string()),
            });
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(path)?;
            let _ = self.changes.send(StorageChange {
                key: key.to_string(),
                new_value: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("iso-hub-store-{}", uuid::Uuid::new_v4().simple()))
    }

    #[test]
    fn test_memory_store_only_notifies_on_change() {
        let store = MemorySessionStore::new();
        let mut rx = store.subscribe();

        store.set_item("authToken", "abc").unwrap();
        store.set_item("authToken", "abc").unwrap();
        store.remove_item("authToken").unwrap();
        store.remove_item("authToken").unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            StorageChange { key: "authToken".into(), new_value: Some("abc".into()) }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StorageChange { key: "authToken".into(), new_value: None }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = temp_dir();
        let store = FileSessionStore::open(&dir).unwrap();
        let mut rx = store.subscribe();

        assert_eq!(store.get_item("authToken").unwrap(), None);
        store.set_item("authToken", "tok").unwrap();
        assert_eq!(store.get_item("authToken").unwrap().as_deref(), Some("tok"));

        // A second handle on the same directory sees the same data.
        let reopened = FileSessionStore::open(&dir).unwrap();
        assert_eq!(reopened.get_item("authToken").unwrap().as_deref(), Some("tok"));

        store.remove_item("authToken").unwrap();
        assert_eq!(store.get_item("authToken").unwrap(), None);

        assert_eq!(rx.try_recv().unwrap().new_value.as_deref(), Some("tok"));
        assert_eq!(rx.try_recv().unwrap().new_value, None);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = temp_dir();
        let store = FileSessionStore::open(&dir).unwrap();
        assert!(matches!(
            store.set_item("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.get_item(""), Err(StoreError::InvalidKey(_))));
        let _ = fs::remove_dir_all(dir);
    }
}
