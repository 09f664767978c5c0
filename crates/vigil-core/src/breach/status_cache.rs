//! Durable cache of per-entry password breach and strength status.

use super::persist;
use super::types::BreachStatus;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// container path → entry id → status
type Store = HashMap<String, HashMap<String, BreachStatus>>;

/// TTL-keyed store of [`BreachStatus`] by (container path, entry id).
///
/// Every mutation is written through to the backing JSON file, if any.
/// Rows older than 24h are dropped when read.
pub struct StatusCache {
    file: Option<PathBuf>,
    store: Mutex<Store>,
}

impl StatusCache {
    /// Open the cache stored at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = persist::load(&path);
        tracing::debug!("Opened breach status cache {}", path.display());
        Self {
            file: Some(path),
            store: Mutex::new(store),
        }
    }

    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            file: None,
            store: Mutex::new(Store::new()),
        }
    }

    /// Default location: `<cache dir>/vigil/breach_status.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("vigil").join("breach_status.json"))
    }

    /// Cached status, or `None` if absent or expired. Expired rows are deleted.
    pub fn get(&self, container: &str, entry_id: &str) -> Option<BreachStatus> {
        let mut store = self.lock();
        let status = store.get(container)?.get(entry_id)?.clone();

        if persist::is_expired(status.timestamp) {
            remove_row(&mut store, container, entry_id);
            self.persist(&store);
            return None;
        }

        Some(status)
    }

    pub fn set(&self, container: &str, entry_id: &str, status: BreachStatus) {
        let mut store = self.lock();
        store
            .entry(container.to_string())
            .or_default()
            .insert(entry_id.to_string(), status);
        self.persist(&store);
    }

    /// Forget every row of one container.
    pub fn clear_container(&self, container: &str) {
        let mut store = self.lock();
        if store.remove(container).is_some() {
            self.persist(&store);
        }
    }

    pub fn clear_all(&self) {
        let mut store = self.lock();
        store.clear();
        if let Some(path) = &self.file {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove cache file {}: {}", path.display(), e);
                }
            }
        }
    }

    pub fn clear_one(&self, container: &str, entry_id: &str) {
        let mut store = self.lock();
        if remove_row(&mut store, container, entry_id) {
            self.persist(&store);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, store: &Store) {
        if let Some(path) = &self.file {
            persist::save(path, store);
        }
    }
}

/// Remove one row, pruning the container when it becomes empty.
fn remove_row(store: &mut Store, container: &str, entry_id: &str) -> bool {
    let Some(rows) = store.get_mut(container) else {
        return false;
    };
    let removed = rows.remove(entry_id).is_some();
    if rows.is_empty() {
        store.remove(container);
    }
    removed
}
