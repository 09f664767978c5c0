//! Shared data types for the credential tree.

use chrono::{NaiveDateTime, Utc};

/// Display name of the synthesized root that aggregates every entry.
pub const AGGREGATE_ROOT_NAME: &str = "All Entries";

/// Represents a group (folder) in the database tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub uuid: String,
    pub name: String,
    pub children: Vec<Group>,
    pub entries: Vec<Entry>,
}

/// Represents a password entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub uuid: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

impl Group {
    /// Create an unsynchronized group. It receives an id on the next export.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: String::new(),
            name: name.into(),
            children: Vec::new(),
            entries: Vec::new(),
        }
    }
}

impl Entry {
    /// Create an empty entry for new entry creation.
    pub fn new() -> Self {
        let now = Utc::now().naive_utc();
        Self {
            uuid: String::new(),
            title: String::new(),
            username: String::new(),
            password: String::new(),
            url: String::new(),
            notes: String::new(),
            created: now,
            modified: now,
        }
    }

    /// Stamp the entry as modified now. Call before handing an edited entry back to the tree.
    pub fn touch(&mut self) {
        self.modified = Utc::now().naive_utc();
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `id` has the 32 hex character shape the container library assigns.
pub fn is_well_formed_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
