//! Host Shell session state.
//!
//! The credential lives in a key-value [`SessionStore`] under two keys: the
//! token key (raw string) and the user key (JSON profile). [`Session`] wraps
//! a store with those keys and is the only accessor the login controller and
//! the auth bridge use.

pub mod store;
pub mod watcher;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::config::StorageConfig;

pub use store::{FileSessionStore, MemorySessionStore};
pub use watcher::{FocusWatcher, SessionSignal, SessionWatcher, StorageWatcher, WatchHandle};

/// Profile of the signed-in Host Shell user. Unknown profile fields are kept
/// so they round-trip into the AUTH payload untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            first_name: None,
            last_name: None,
            email: None,
            extra: Map::new(),
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => self
                .email
                .clone()
                .unwrap_or_else(|| self.id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub token: String,
    pub user: UserProfile,
}

/// A single key change, shaped like a browser `StorageEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Client-side key-value storage. Implementations broadcast a
/// [`StorageChange`] for every write that actually changes a value.
pub trait SessionStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Typed accessor over a [`SessionStore`] using the configured keys.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
    keys: StorageConfig,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>, keys: StorageConfig) -> Self {
        Self { store, keys }
    }

    pub fn token_key(&self) -> &str {
        &self.keys.token_key
    }

    /// Current token. Storage failures read as "no session".
    pub fn token(&self) -> Option<String> {
        match self.store.get_item(&self.keys.token_key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!("Failed to read session token: {}", e);
                None
            }
        }
    }

    pub fn user(&self) -> Option<UserProfile> {
        let raw = match self.store.get_item(&self.keys.user_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read session user: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Stored user profile is malformed: {}", e);
                None
            }
        }
    }

    pub fn get(&self) -> Option<SessionCredential> {
        let token = self.token()?;
        let user = self.user()?;
        Some(SessionCredential { token, user })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Store a new credential. The user is written before the token so a
    /// listener woken by the token change always sees the matching profile.
    pub fn set(&self, credential: &SessionCredential) -> Result<(), StoreError> {
        let user = serde_json::to_string(&credential.user)?;
        self.store.set_item(&self.keys.user_key, &user)?;
        self.store.set_item(&self.keys.token_key, &credential.token)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove_item(&self.keys.token_key)?;
        self.store.remove_item(&self.keys.user_key)?;
        Ok(())
    }

    pub fn on_change(&self) -> broadcast::Receiver<StorageChange> {
        self.store.subscribe()
    }
}
