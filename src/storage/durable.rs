//! Durable Key-Value Storage
//!
//! Small string key-value store that survives restarts. Holds resume tickets.
//! Missing or corrupt files read as empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_parent_dir, storage_path};

/// String key-value storage shared by client features
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> AppResult<()>;

    fn remove(&self, key: &str) -> AppResult<()>;

    /// Read and delete several keys under one lock.
    fn take(&self, keys: &[&str]) -> AppResult<Vec<Option<String>>>;

    /// Write `entries` and delete `removals` under one lock.
    fn replace(&self, removals: &[&str], entries: &[(&str, &str)]) -> AppResult<()>;
}

fn lock_map(map: &Mutex<BTreeMap<String, String>>) -> AppResult<MutexGuard<'_, BTreeMap<String, String>>> {
    map.lock()
        .map_err(|_| AppError::internal("durable store mutex poisoned"))
}

/// JSON file at `~/.seo-pipeline/storage.json`, rewritten on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the default storage file
    pub fn new() -> AppResult<Self> {
        Self::open(storage_path()?)
    }

    pub fn open(path: PathBuf) -> AppResult<Self> {
        ensure_parent_dir(&path)?;
        let entries = Self::load(&path);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt storage file");
                BTreeMap::new()
            }
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)
            .map_err(|e| AppError::storage(format!("Failed to write {}: {}", self.path.display(), e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(lock_map(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = lock_map(&self.entries)?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = lock_map(&self.entries)?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn take(&self, keys: &[&str]) -> AppResult<Vec<Option<String>>> {
        let mut entries = lock_map(&self.entries)?;
        let taken: Vec<Option<String>> = keys.iter().map(|k| entries.remove(*k)).collect();
        if taken.iter().any(Option::is_some) {
            self.persist(&entries)?;
        }
        Ok(taken)
    }

    fn replace(&self, removals: &[&str], new_entries: &[(&str, &str)]) -> AppResult<()> {
        let mut entries = lock_map(&self.entries)?;
        for key in removals {
            entries.remove(*key);
        }
        for (key, value) in new_entries {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(&entries)
    }
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_map(&self.entries).map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(lock_map(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        lock_map(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        lock_map(&self.entries)?.remove(key);
        Ok(())
    }

    fn take(&self, keys: &[&str]) -> AppResult<Vec<Option<String>>> {
        let mut entries = lock_map(&self.entries)?;
        Ok(keys.iter().map(|k| entries.remove(*k)).collect())
    }

    fn replace(&self, removals: &[&str], new_entries: &[(&str, &str)]) -> AppResult<()> {
        let mut entries = lock_map(&self.entries)?;
        for key in removals {
            entries.remove(*key);
        }
        for (key, value) in new_entries {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}
