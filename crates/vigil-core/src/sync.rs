//! Synchronization between the plain credential tree and the live KeePass graph.
//!
//! [`import_tree`] produces a detached copy of the live graph that the UI can
//! freely edit. [`export_edits`] writes the edited tree back, matching groups
//! and entries by id so that identifiers stay stable across renames, moves,
//! creates and deletes.

use crate::models::{is_well_formed_id, Entry, Group, AGGREGATE_ROOT_NAME};
use chrono::{NaiveDateTime, Utc};
use keepass::db::{Node, Value};
use secstr::SecStr;
use std::collections::HashMap;
use uuid::Uuid;

/// Format a KeePass UUID the way the plain tree stores it (32 hex characters).
pub fn format_id(uuid: &Uuid) -> String {
    uuid.simple().to_string()
}

/// Parse a plain-tree id back into a UUID. Returns `None` for new or malformed ids.
pub fn parse_id(id: &str) -> Option<Uuid> {
    if !is_well_formed_id(id) {
        return None;
    }
    Uuid::parse_str(id).ok()
}

/// Convert the live graph into a fully detached plain tree.
///
/// The returned root is always named [`AGGREGATE_ROOT_NAME`], whatever the
/// container stores as its root group name.
pub fn import_tree(root: &keepass::db::Group) -> Group {
    let mut tree = convert_group(root);
    tree.name = AGGREGATE_ROOT_NAME.to_string();
    tree
}

/// Convert a keepass::Group to our Group model.
fn convert_group(kg: &keepass::db::Group) -> Group {
    Group {
        uuid: format_id(&kg.uuid),
        name: kg.name.clone(),
        children: kg
            .children
            .iter()
            .filter_map(|node| {
                if let Node::Group(g) = node {
                    Some(convert_group(g))
                } else {
                    None
                }
            })
            .collect(),
        entries: kg
            .children
            .iter()
            .filter_map(|node| {
                if let Node::Entry(e) = node {
                    Some(convert_entry(e))
                } else {
                    None
                }
            })
            .collect(),
    }
}

/// Convert a keepass::Entry to our Entry model.
fn convert_entry(ke: &keepass::db::Entry) -> Entry {
    Entry {
        uuid: format_id(&ke.uuid),
        title: ke.get_title().unwrap_or_default().to_string(),
        username: ke.get_username().unwrap_or_default().to_string(),
        password: ke.get_password().unwrap_or_default().to_string(),
        url: ke.get_url().unwrap_or_default().to_string(),
        notes: ke.get("Notes").unwrap_or_default().to_string(),
        created: ke.times.get_creation().copied().unwrap_or_else(now),
        modified: ke
            .times
            .get_last_modification()
            .copied()
            .unwrap_or_else(now),
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Live nodes detached from the graph while it is being rebuilt, keyed by UUID.
#[derive(Default)]
struct LivePool {
    groups: HashMap<Uuid, keepass::db::Group>,
    entries: HashMap<Uuid, keepass::db::Entry>,
}

impl LivePool {
    /// Detach every descendant of `group` into the pool.
    fn drain(&mut self, group: &mut keepass::db::Group) {
        for node in std::mem::take(&mut group.children) {
            match node {
                Node::Entry(e) => {
                    self.entries.insert(e.uuid, e);
                }
                Node::Group(mut g) => {
                    self.drain(&mut g);
                    self.groups.insert(g.uuid, g);
                }
            }
        }
    }
}

/// Write the edited plain tree back onto the live graph.
///
/// Live nodes are matched by id anywhere in the graph, so a moved group or
/// entry keeps its UUID and any data the plain tree does not model (icons,
/// history, attachments, custom fields). Nodes missing from the tree are
/// dropped. Nodes without a usable id are created and their new id is
/// written back into `tree`.
pub fn export_edits(tree: &mut Group, live_root: &mut keepass::db::Group) {
    let mut pool = LivePool::default();
    pool.drain(live_root);

    rebuild_group(tree, live_root, &mut pool);

    if !pool.groups.is_empty() || !pool.entries.is_empty() {
        tracing::debug!(
            "Removed {} groups and {} entries from the container",
            pool.groups.len(),
            pool.entries.len()
        );
    }
}

fn rebuild_group(tree: &mut Group, live: &mut keepass::db::Group, pool: &mut LivePool) {
    let mut children = Vec::with_capacity(tree.entries.len() + tree.children.len());

    for entry in &mut tree.entries {
        let mut ke = match parse_id(&entry.uuid) {
            Some(uuid) => pool.entries.remove(&uuid).unwrap_or_else(|| {
                let mut ke = keepass::db::Entry::new();
                ke.uuid = uuid;
                ke
            }),
            None => keepass::db::Entry::new(),
        };
        entry.uuid = format_id(&ke.uuid);
        write_entry(entry, &mut ke);
        children.push(Node::Entry(ke));
    }

    for subgroup in &mut tree.children {
        let mut kg = match parse_id(&subgroup.uuid).and_then(|uuid| pool.groups.remove(&uuid)) {
            Some(kg) => kg,
            None => {
                let kg = keepass::db::Group::new(&subgroup.name);
                tracing::debug!("Created group '{}' ({})", subgroup.name, kg.uuid);
                subgroup.uuid = format_id(&kg.uuid);
                kg
            }
        };
        kg.name = subgroup.name.clone();
        rebuild_group(subgroup, &mut kg, pool);
        children.push(Node::Group(kg));
    }

    live.children = children;
}

/// Copy the modelled fields of `entry` onto the live entry.
fn write_entry(entry: &Entry, ke: &mut keepass::db::Entry) {
    ke.fields.insert(
        "Title".to_string(),
        Value::Unprotected(entry.title.clone()),
    );
    ke.fields.insert(
        "UserName".to_string(),
        Value::Unprotected(entry.username.clone()),
    );
    ke.fields.insert(
        "Password".to_string(),
        Value::Protected(SecStr::new(entry.password.as_bytes().to_vec())),
    );
    set_optional(ke, "URL", &entry.url);
    set_optional(ke, "Notes", &entry.notes);

    ke.times.set_creation(entry.created);
    ke.times.set_last_modification(entry.modified);
}

fn set_optional(ke: &mut keepass::db::Entry, key: &str, value: &str) {
    if value.is_empty() {
        ke.fields.remove(key);
    } else {
        ke.fields
            .insert(key.to_string(), Value::Unprotected(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree;

    fn live_entry(title: &str, username: &str, password: &str) -> keepass::db::Entry {
        let mut e = keepass::db::Entry::new();
        e.fields
            .insert("Title".to_string(), Value::Unprotected(title.to_string()));
        e.fields.insert(
            "UserName".to_string(),
            Value::Unprotected(username.to_string()),
        );
        e.fields.insert(
            "Password".to_string(),
            Value::Protected(SecStr::new(password.as_bytes().to_vec())),
        );
        e
    }

    /// Root "Vault" with one entry, and a "Work" group holding a "Servers" group.
    fn sample_live() -> keepass::db::Group {
        let mut root = keepass::db::Group::new("Vault");
        root.children
            .push(Node::Entry(live_entry("Mail", "me@example.com", "hunter2")));

        let mut work = keepass::db::Group::new("Work");
        work.children
            .push(Node::Entry(live_entry("VPN", "me", "correct horse")));
        let mut servers = keepass::db::Group::new("Servers");
        servers
            .children
            .push(Node::Entry(live_entry("db01", "root", "toor")));
        work.children.push(Node::Group(servers));
        root.children.push(Node::Group(work));
        root
    }

    fn shape(group: &keepass::db::Group) -> Vec<String> {
        let mut out = Vec::new();
        collect_shape(group, "", &mut out);
        out.sort();
        out
    }

    fn collect_shape(group: &keepass::db::Group, prefix: &str, out: &mut Vec<String>) {
        let path = format!("{}/{}:{}", prefix, group.name, group.uuid);
        out.push(path.clone());
        for node in &group.children {
            match node {
                Node::Entry(e) => out.push(format!(
                    "{}/{}:{}",
                    path,
                    e.get_title().unwrap_or_default(),
                    e.uuid
                )),
                Node::Group(g) => collect_shape(g, &path, out),
            }
        }
    }

    #[test]
    fn import_copies_fields_and_names_root() {
        let live = sample_live();
        let tree = import_tree(&live);

        assert_eq!(tree.name, AGGREGATE_ROOT_NAME);
        assert_eq!(tree.uuid, format_id(&live.uuid));
        assert_eq!(tree.uuid.len(), 32);
        assert_eq!(tree.entries.len(), 1);
        assert_eq!(tree.entries[0].title, "Mail");
        assert_eq!(tree.entries[0].username, "me@example.com");
        assert_eq!(tree.entries[0].password, "hunter2");
        assert_eq!(tree.children[0].name, "Work");
        assert_eq!(tree.children[0].children[0].entries[0].password, "toor");
    }

    #[test]
    fn round_trip_preserves_structure() {
        let mut live = sample_live();
        let before = shape(&live);

        let mut tree = import_tree(&live);
        export_edits(&mut tree, &mut live);

        assert_eq!(shape(&live), before);
        assert_eq!(live.name, "Vault");
        assert_eq!(import_tree(&live), tree);
    }

    #[test]
    fn new_nodes_receive_ids_written_back() {
        let mut live = sample_live();
        let mut tree = import_tree(&live);
        let root_id = tree.uuid.clone();

        assert!(tree::add_group(&mut tree, &root_id, "Personal"));
        let personal = tree.children.last_mut().unwrap();
        let mut entry = Entry::new();
        entry.title = "Bank".to_string();
        entry.password = "s3cret".to_string();
        personal.entries.push(entry);

        export_edits(&mut tree, &mut live);

        let personal = tree.children.last().unwrap();
        assert!(is_well_formed_id(&personal.uuid));
        assert!(is_well_formed_id(&personal.entries[0].uuid));

        let reimported = import_tree(&live);
        let found = tree::find_group(&reimported, &personal.uuid).unwrap();
        assert_eq!(found.name, "Personal");
        assert_eq!(found.entries[0].uuid, personal.entries[0].uuid);
        assert_eq!(found.entries[0].password, "s3cret");
    }

    #[test]
    fn removed_nodes_leave_the_live_graph() {
        let mut live = sample_live();
        let mut tree = import_tree(&live);
        let work_id = tree.children[0].uuid.clone();
        let mail_id = tree.entries[0].uuid.clone();

        assert!(tree::remove_group(&mut tree, &work_id));
        assert!(tree::remove_entry(&mut tree, &mail_id));
        export_edits(&mut tree, &mut live);

        assert!(live.children.is_empty());
    }

    #[test]
    fn moved_entry_keeps_id_and_unmodelled_fields() {
        let mut live = sample_live();
        if let Node::Entry(e) = &mut live.children[0] {
            e.fields
                .insert("Recovery".to_string(), Value::Unprotected("codes".to_string()));
        }
        let mut tree = import_tree(&live);
        let mail_id = tree.entries[0].uuid.clone();
        let servers_id = tree.children[0].children[0].uuid.clone();

        assert!(tree::move_entry(&mut tree, &mail_id, &servers_id));
        export_edits(&mut tree, &mut live);

        let reimported = import_tree(&live);
        assert!(reimported.entries.is_empty());
        let servers = tree::find_group(&reimported, &servers_id).unwrap();
        assert!(servers.entries.iter().any(|e| e.uuid == mail_id));

        let Some(Node::Group(work)) = live.children.first() else {
            panic!("expected the Work group");
        };
        let Some(Node::Group(servers)) = work.children.iter().find(|n| matches!(n, Node::Group(_))) else {
            panic!("expected the Servers group");
        };
        let moved = servers
            .children
            .iter()
            .find_map(|n| match n {
                Node::Entry(e) if format_id(&e.uuid) == mail_id => Some(e),
                _ => None,
            })
            .unwrap();
        assert_eq!(moved.get("Recovery"), Some("codes"));
    }

    #[test]
    fn moved_group_keeps_id() {
        let mut live = sample_live();
        let mut tree = import_tree(&live);
        let root_id = tree.uuid.clone();
        let servers_id = tree.children[0].children[0].uuid.clone();

        assert!(tree::move_group(&mut tree, &servers_id, &root_id));
        export_edits(&mut tree, &mut live);

        let reimported = import_tree(&live);
        assert!(reimported.children.iter().any(|g| g.uuid == servers_id));
        assert_eq!(reimported.children.len(), 2);
        assert!(reimported.children[0].children.is_empty());
    }

    #[test]
    fn well_formed_unknown_entry_id_is_reapplied() {
        let mut live = sample_live();
        let mut tree = import_tree(&live);
        let mut entry = Entry::new();
        entry.uuid = "00112233445566778899aabbccddeeff".to_string();
        entry.title = "Imported".to_string();
        tree.entries.push(entry);

        export_edits(&mut tree, &mut live);

        let reimported = import_tree(&live);
        assert!(reimported
            .entries
            .iter()
            .any(|e| e.uuid == "00112233445566778899aabbccddeeff" && e.title == "Imported"));
    }

    #[test]
    fn rename_reaches_live_group_but_root_name_is_kept() {
        let mut live = sample_live();
        let mut tree = import_tree(&live);
        let work_id = tree.children[0].uuid.clone();

        assert!(tree::rename_group(&mut tree, &work_id, "Office"));
        export_edits(&mut tree, &mut live);

        assert_eq!(live.name, "Vault");
        let reimported = import_tree(&live);
        assert_eq!(reimported.children[0].name, "Office");
        assert_eq!(reimported.children[0].uuid, work_id);
    }

    #[test]
    fn empty_optional_fields_are_removed() {
        let mut live = sample_live();
        if let Node::Entry(e) = &mut live.children[0] {
            e.fields
                .insert("URL".to_string(), Value::Unprotected("https://mail.example".to_string()));
        }
        let mut tree = import_tree(&live);
        assert_eq!(tree.entries[0].url, "https://mail.example");
        tree.entries[0].url.clear();

        export_edits(&mut tree, &mut live);

        let Some(Node::Entry(e)) = live.children.first() else {
            panic!("expected the Mail entry first");
        };
        assert!(e.get_url().is_none());
    }
}
