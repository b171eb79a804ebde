//! History persistence: the whole conversation set serialized under one
//! storage key per identity.
//!
//! Loads degrade gracefully (absent or malformed documents yield an empty
//! set) and save failures are logged and swallowed, so persistence problems
//! never interrupt an active conversation.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};

use crate::error::PersistenceError;
use crate::models::ConversationSet;

const HISTORY_KEY_PREFIX: &str = "history";
const GUEST_IDENTITY: &str = "guest";

// === Storage backends ===

/// String key/value storage. Implementations must tolerate keys containing
/// `:` separators.
pub trait KeyedStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// In-memory storage, shared across clones. Used in tests and as a fallback
/// when no durable backend is available.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyedStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed storage: one JSON document per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Storage rooted at the platform data directory.
    pub fn default_location() -> Result<Self> {
        let root = dirs::data_dir()
            .context("Failed to resolve data directory")?
            .join("aihub");
        Ok(Self::new(root))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl KeyedStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.root).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        fs::write(self.path_for(key), value)
            .map_err(|e| PersistenceError::Storage(e.to_string()))
    }
}

// === History adapter ===

/// Serializes the full conversation set under `history:<identity>`.
#[derive(Debug, Clone)]
#[must_use]
pub struct HistoryPersistence<S: KeyedStorage> {
    storage: S,
}

impl<S: KeyedStorage> HistoryPersistence<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the history for an identity. Absent or unreadable documents
    /// yield an empty set rather than an error.
    pub fn load(&self, identity: Option<&str>) -> ConversationSet {
        let key = storage_key(identity);
        let Some(raw) = self.storage.get(&key) else {
            return ConversationSet::default();
        };
        match serde_json::from_str(&raw) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding malformed history document");
                ConversationSet::default()
            }
        }
    }

    /// Persist the full history for an identity. Failures are logged and
    /// swallowed so the in-memory conversation stays authoritative.
    pub fn save(&self, identity: Option<&str>, conversations: &ConversationSet) {
        let key = storage_key(identity);
        let serialized = match serde_json::to_string(conversations) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to serialize history");
                return;
            }
        };
        if let Err(e) = self.storage.set(&key, &serialized) {
            tracing::warn!(key = %key, error = %e, "failed to persist history");
        }
    }
}

fn storage_key(identity: Option<&str>) -> String {
    format!(
        "{HISTORY_KEY_PREFIX}:{}",
        identity.unwrap_or(GUEST_IDENTITY)
    )
}
