//! KeePass database operations wrapper.

use crate::models::{Entry, Group};
use crate::{sync, tree};
use anyhow::{Context, Result};
use keepass::{config::DatabaseConfig, Database, DatabaseKey};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Wrapper around the KeePass database for easier operations.
pub struct KeepassDatabase {
    db: Database,
    path: PathBuf,
    key: DatabaseKey,
    fallback_dir: Option<PathBuf>,
}

impl KeepassDatabase {
    /// Open and unlock a KeePass database.
    pub fn unlock(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref();

        let key = DatabaseKey::new().with_password(password);

        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open database file: {}", path.display()))?;
        let db = Database::open(&mut file, key.clone())
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        tracing::info!("Unlocked database {}", path.display());

        Ok(Self {
            db,
            path: path.to_path_buf(),
            key,
            fallback_dir: None,
        })
    }

    /// Create a new, empty database in memory. Nothing is written until [`save`](Self::save).
    pub fn create(path: impl AsRef<Path>, password: &str, name: &str) -> Self {
        let mut db = Database::new(DatabaseConfig::default());
        db.meta.database_name = Some(name.to_string());
        db.root.name = name.to_string();

        Self {
            db,
            path: path.as_ref().to_path_buf(),
            key: DatabaseKey::new().with_password(password),
            fallback_dir: None,
        }
    }

    /// Directory used when saving to the primary path fails.
    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// Path the database is saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detached, editable copy of the whole tree.
    pub fn root_group(&self) -> Group {
        sync::import_tree(&self.db.root)
    }

    /// Find an entry by UUID.
    pub fn find_entry(&self, uuid: &str) -> Option<Entry> {
        let root = self.root_group();
        tree::find_entry_and_group(&root, uuid).map(|(_, entry)| entry.clone())
    }

    /// Write an edited tree back onto the open database.
    ///
    /// Ids assigned to new groups and entries are written back into `tree`.
    /// Only memory is touched; call [`save`](Self::save) to persist.
    pub fn apply_tree(&mut self, tree: &mut Group) {
        sync::export_edits(tree, &mut self.db.root);
    }

    /// Save the database, falling back to the recovery directory if the primary path fails.
    ///
    /// Returns the path actually written. After a fallback save the database
    /// keeps saving to the fallback location.
    pub fn save(&mut self) -> Result<PathBuf> {
        let primary_err = match self.save_to(&self.path) {
            Ok(()) => return Ok(self.path.clone()),
            Err(e) => e,
        };
        tracing::warn!("Failed to save database to {}: {:#}", self.path.display(), primary_err);

        let fallback = self.fallback_path().with_context(|| {
            format!(
                "Failed to save database to {} ({:#})",
                self.path.display(),
                primary_err
            )
        })?;
        match self.save_to(&fallback) {
            Ok(()) => {
                tracing::info!("Saved database to fallback location {}", fallback.display());
                self.path = fallback.clone();
                Ok(fallback)
            }
            Err(fallback_err) => Err(fallback_err.context(format!(
                "Failed to save database to {} ({:#}) and to fallback {}",
                self.path.display(),
                primary_err,
                fallback.display()
            ))),
        }
    }

    /// Serialize the database to `path` atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

        self.db
            .save(file.as_file_mut(), self.key.clone())
            .with_context(|| "Failed to save database")?;
        file.as_file_mut().flush()?;

        file.persist(path)
            .with_context(|| format!("Failed to create database file: {}", path.display()))?;

        Ok(())
    }

    fn fallback_path(&self) -> Result<PathBuf> {
        let dir = match &self.fallback_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .context("Could not determine data directory")?
                .join("vigil")
                .join("recovered"),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create fallback directory: {}", dir.display()))?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "database.kdbx".into());
        Ok(dir.join(file_name))
    }
}
