//! JSON persistence and expiry shared by the breach caches.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Age after which a cached row reads as absent.
pub fn cache_ttl() -> Duration {
    Duration::hours(24)
}

pub fn is_expired(timestamp: DateTime<Utc>) -> bool {
    Utc::now() - timestamp > cache_ttl()
}

/// Load a cache file. A missing or unreadable file yields an empty store.
pub fn load<T: DeserializeOwned + Default>(path: &Path) -> T {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!("Failed to read cache file {}: {}", path.display(), e);
            return T::default();
        }
    };

    serde_json::from_str(&contents).unwrap_or_else(|e| {
        tracing::warn!("Discarding unreadable cache file {}: {}", path.display(), e);
        T::default()
    })
}

/// Rewrite a cache file. Failures are logged only; cached status is advisory.
pub fn save<T: Serialize>(path: &Path, value: &T) {
    if let Err(e) = try_save(path, value) {
        tracing::warn!("Failed to write cache file {}: {:#}", path.display(), e);
    }
}

fn try_save<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string(value)?;
    std::fs::write(path, contents)?;
    Ok(())
}
