//! Durable cache of email breach lists.
//!
//! Results are stored once per email address. A secondary index maps entry
//! ids to the email they were last checked with, so two entries sharing an
//! address reuse one lookup and can never see diverging copies.

use super::persist;
use super::types::EmailBreachStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContainerEmails {
    /// entry id → email
    #[serde(default)]
    entries: HashMap<String, String>,
    /// email → status
    #[serde(default)]
    emails: HashMap<String, EmailBreachStatus>,
}

impl ContainerEmails {
    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.emails.is_empty()
    }

    /// Valid status for `email`, dropping it if it has expired.
    fn fresh(&mut self, email: &str) -> Option<EmailBreachStatus> {
        let status = self.emails.get(email)?;
        if persist::is_expired(status.timestamp) {
            self.emails.remove(email);
            return None;
        }
        Some(status.clone())
    }
}

type Store = HashMap<String, ContainerEmails>;

/// TTL-keyed store of [`EmailBreachStatus`] by (container path, email),
/// indexed by entry id.
pub struct EmailStatusCache {
    file: Option<PathBuf>,
    store: Mutex<Store>,
}

impl EmailStatusCache {
    /// Open the cache stored at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = persist::load(&path);
        tracing::debug!("Opened email breach cache {}", path.display());
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

    /// Default location: `<cache dir>/vigil/email_breach_status.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("vigil").join("email_breach_status.json"))
    }

    /// Cached breaches for an entry checked with `email`.
    ///
    /// The shared email row wins; on a hit the entry is (re)indexed to it.
    /// Otherwise the email the entry was last checked with is consulted.
    pub fn get_by_entry(&self, container: &str, entry_id: &str, email: &str) -> Option<EmailBreachStatus> {
        let mut store = self.lock();
        let db = store.get_mut(container)?;
        let before = (db.entries.len(), db.emails.len());

        let mut found = db.fresh(email);
        if found.is_some() {
            if db.entries.get(entry_id).map(String::as_str) != Some(email) {
                db.entries.insert(entry_id.to_string(), email.to_string());
                self.persist(&store);
            }
            return found;
        }

        if let Some(previous) = db.entries.get(entry_id).cloned() {
            found = db.fresh(&previous);
            if found.is_none() {
                db.entries.remove(entry_id);
            }
        }

        let changed = before != (db.entries.len(), db.emails.len());
        if db.is_empty() {
            store.remove(container);
        }
        if changed {
            self.persist(&store);
        }
        found
    }

    /// Cached breaches for an email address, regardless of entry.
    pub fn get_by_email(&self, container: &str, email: &str) -> Option<EmailBreachStatus> {
        let mut store = self.lock();
        let db = store.get_mut(container)?;
        let before = db.emails.len();
        let found = db.fresh(email);

        let changed = before != db.emails.len();
        if db.is_empty() {
            store.remove(container);
        }
        if changed {
            self.persist(&store);
        }
        found
    }

    /// Record the result of checking `email` on behalf of `entry_id`.
    pub fn set_for_entry(&self, container: &str, entry_id: &str, email: &str, status: EmailBreachStatus) {
        let mut store = self.lock();
        let db = store.entry(container.to_string()).or_default();
        db.emails.insert(email.to_string(), status);
        db.entries.insert(entry_id.to_string(), email.to_string());
        self.persist(&store);
    }

    /// Record the result of checking `email` without indexing any entry.
    pub fn set_for_email(&self, container: &str, email: &str, status: EmailBreachStatus) {
        let mut store = self.lock();
        let db = store.entry(container.to_string()).or_default();
        db.emails.insert(email.to_string(), status);
        self.persist(&store);
    }

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

    /// Drop an entry's index row. The shared email row is kept.
    pub fn clear_one(&self, container: &str, entry_id: &str) {
        self.mutate(container, |db| db.entries.remove(entry_id).is_some());
    }

    /// Drop the cached result for an email address.
    pub fn clear_email(&self, container: &str, email: &str) {
        self.mutate(container, |db| db.emails.remove(email).is_some());
    }

    fn mutate(&self, container: &str, f: impl FnOnce(&mut ContainerEmails) -> bool) {
        let mut store = self.lock();
        let Some(db) = store.get_mut(container) else {
            return;
        };
        if !f(db) {
            return;
        }
        if db.is_empty() {
            store.remove(container);
        }
        self.persist(&store);
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
