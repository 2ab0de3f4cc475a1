//! A flat, string-keyed response cache backed by a persisted key/value store.
//!
//! There is no expiry, size bound or invalidation. Values are stored as
//! strings, so only UTF-8 payloads can be cached; anything else is refused
//! with `CacheError::NotText` rather than silently mangled.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use crate::error::CacheError;

/// String key/value persistence. Implementations handle their own locking.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: String) -> Result<(), CacheError>;
}

/// Process-local store with no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set_string(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// A store kept as a single JSON object on disk, rewritten on every write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open `path`, loading existing entries. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set_string(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Memory only changes once the new contents are on disk.
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        let raw = serde_json::to_vec(&next)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        *entries = next;
        Ok(())
    }
}

/// Byte-oriented facade over a `KeyValueStore`.
#[derive(Debug)]
pub struct Cache<S> {
    store: S,
}

impl<S: KeyValueStore> Cache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let text = std::str::from_utf8(value).map_err(|_| CacheError::NotText)?;
        tracing::trace!(key, len = value.len(), "cache put");
        self.store.set_string(key, text.to_string())
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.store.get_string(key).map(Bytes::from)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
