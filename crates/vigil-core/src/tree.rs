//! Structural edits on the plain credential tree.
//!
//! Every mutating operation returns `true` when it was applied and `false`
//! when it was rejected (unknown ids, self moves, cycles, root removal).
//! Rejections leave the tree untouched.

use crate::models::{Entry, Group};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// A search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched entry.
    pub entry: Entry,
    /// Path to the entry (for display).
    pub path: String,
    /// Parent group UUID.
    pub group_uuid: String,
    /// Match score for sorting.
    pub score: i64,
}

/// Find a group by UUID recursively.
pub fn find_group<'a>(group: &'a Group, uuid: &str) -> Option<&'a Group> {
    if group.uuid == uuid {
        return Some(group);
    }
    group.children.iter().find_map(|child| find_group(child, uuid))
}

/// Mutable variant of [`find_group`].
pub fn find_group_mut<'a>(group: &'a mut Group, uuid: &str) -> Option<&'a mut Group> {
    if group.uuid == uuid {
        return Some(group);
    }
    group
        .children
        .iter_mut()
        .find_map(|child| find_group_mut(child, uuid))
}

/// Find an entry and its parent group by entry UUID.
pub fn find_entry_and_group<'a>(group: &'a Group, entry_uuid: &str) -> Option<(&'a Group, &'a Entry)> {
    if let Some(entry) = group.entries.iter().find(|e| e.uuid == entry_uuid) {
        return Some((group, entry));
    }
    group
        .children
        .iter()
        .find_map(|child| find_entry_and_group(child, entry_uuid))
}

/// Recursively count entries in a group.
pub fn count_entries(group: &Group) -> usize {
    group.entries.len() + group.children.iter().map(count_entries).sum::<usize>()
}

/// All entries of the subtree, depth first with each group's entries before its subgroups.
pub fn all_entries(group: &Group) -> Vec<&Entry> {
    let mut out = Vec::with_capacity(count_entries(group));
    collect_entries(group, &mut out);
    out
}

fn collect_entries<'a>(group: &'a Group, out: &mut Vec<&'a Entry>) {
    out.extend(group.entries.iter());
    for child in &group.children {
        collect_entries(child, out);
    }
}

/// Whether the group `target_uuid` is `ancestor` itself or lies anywhere below it.
pub fn is_group_in_hierarchy(target_uuid: &str, ancestor: &Group) -> bool {
    ancestor.uuid == target_uuid
        || ancestor
            .children
            .iter()
            .any(|child| is_group_in_hierarchy(target_uuid, child))
}

/// Rename a group. Ids and children are untouched.
pub fn rename_group(root: &mut Group, group_uuid: &str, name: &str) -> bool {
    match find_group_mut(root, group_uuid) {
        Some(group) => {
            group.name = name.to_string();
            true
        }
        None => false,
    }
}

/// Append a new, not yet synchronized group under `parent_uuid`.
pub fn add_group(root: &mut Group, parent_uuid: &str, name: &str) -> bool {
    match find_group_mut(root, parent_uuid) {
        Some(parent) => {
            parent.children.push(Group::new(name));
            true
        }
        None => false,
    }
}

/// Detach a group and its whole subtree. The root can never be removed.
pub fn remove_group(root: &mut Group, group_uuid: &str) -> bool {
    if root.uuid == group_uuid {
        return false;
    }
    detach_group(root, group_uuid).is_some()
}

fn detach_group(group: &mut Group, group_uuid: &str) -> Option<Group> {
    if let Some(index) = group.children.iter().position(|g| g.uuid == group_uuid) {
        return Some(group.children.remove(index));
    }
    group
        .children
        .iter_mut()
        .find_map(|child| detach_group(child, group_uuid))
}

/// Remove an entry wherever it lives.
pub fn remove_entry(root: &mut Group, entry_uuid: &str) -> bool {
    detach_entry(root, entry_uuid).is_some()
}

fn detach_entry(group: &mut Group, entry_uuid: &str) -> Option<Entry> {
    if let Some(index) = group.entries.iter().position(|e| e.uuid == entry_uuid) {
        return Some(group.entries.remove(index));
    }
    group
        .children
        .iter_mut()
        .find_map(|child| detach_entry(child, entry_uuid))
}

/// Move a group to the end of `new_parent_uuid`'s children.
///
/// Rejected when moving the root, moving a group onto itself, or moving it
/// anywhere inside its own subtree.
pub fn move_group(root: &mut Group, group_uuid: &str, new_parent_uuid: &str) -> bool {
    if group_uuid == new_parent_uuid || root.uuid == group_uuid {
        return false;
    }
    let Some(source) = find_group(root, group_uuid) else {
        return false;
    };
    if is_group_in_hierarchy(new_parent_uuid, source) {
        return false;
    }
    if find_group(root, new_parent_uuid).is_none() {
        return false;
    }

    let Some(group) = detach_group(root, group_uuid) else {
        return false;
    };
    match find_group_mut(root, new_parent_uuid) {
        Some(parent) => {
            parent.children.push(group);
            true
        }
        None => false,
    }
}

/// Move an entry to the end of `target_uuid`'s entries, keeping its id.
pub fn move_entry(root: &mut Group, entry_uuid: &str, target_uuid: &str) -> bool {
    let Some((source, _)) = find_entry_and_group(root, entry_uuid) else {
        return false;
    };
    if source.uuid == target_uuid || find_group(root, target_uuid).is_none() {
        return false;
    }

    let Some(entry) = detach_entry(root, entry_uuid) else {
        return false;
    };
    match find_group_mut(root, target_uuid) {
        Some(target) => {
            target.entries.push(entry);
            true
        }
        None => false,
    }
}

/// Replace the entry with the same id, or append it to `group_uuid` (the root if unknown).
///
/// Entries with an empty id are always appended.
pub fn upsert_entry(root: &mut Group, entry: Entry, group_uuid: &str) {
    if !entry.uuid.is_empty() {
        if let Some(existing) = find_entry_mut(root, &entry.uuid) {
            *existing = entry;
            return;
        }
    }
    if find_group(root, group_uuid).is_none() {
        root.entries.push(entry);
    } else if let Some(group) = find_group_mut(root, group_uuid) {
        group.entries.push(entry);
    }
}

fn find_entry_mut<'a>(group: &'a mut Group, entry_uuid: &str) -> Option<&'a mut Entry> {
    if let Some(index) = group.entries.iter().position(|e| e.uuid == entry_uuid) {
        return group.entries.get_mut(index);
    }
    group
        .children
        .iter_mut()
        .find_map(|child| find_entry_mut(child, entry_uuid))
}

/// Fuzzy search over title, username, URL and group path, best matches first.
pub fn search_entries(root: &Group, query: &str, limit: usize) -> Vec<SearchResult> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let matcher = SkimMatcherV2::default();

    // Collect all entries with their paths
    let mut items = Vec::new();
    collect_with_paths(root, "", &mut items);

    let mut scored: Vec<_> = items
        .into_iter()
        .filter_map(|(entry, path, group_uuid)| {
            let search_text = format!("{} {} {} {}", entry.title, entry.username, entry.url, path);
            matcher
                .fuzzy_match(&search_text, query)
                .map(|score| SearchResult {
                    entry: entry.clone(),
                    path,
                    group_uuid,
                    score,
                })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);
    scored
}

fn collect_with_paths<'a>(group: &'a Group, path: &str, items: &mut Vec<(&'a Entry, String, String)>) {
    let current_path = if path.is_empty() {
        group.name.clone()
    } else {
        format!("{} / {}", path, group.name)
    };

    for entry in &group.entries {
        items.push((entry, current_path.clone(), group.uuid.clone()));
    }

    for child in &group.children {
        collect_with_paths(child, &current_path, items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uuid: &str, title: &str) -> Entry {
        Entry {
            uuid: uuid.to_string(),
            title: title.to_string(),
            ..Entry::new()
        }
    }

    fn group(uuid: &str, name: &str, children: Vec<Group>, entries: Vec<Entry>) -> Group {
        Group {
            uuid: uuid.to_string(),
            name: name.to_string(),
            children,
            entries,
        }
    }

    /// root ─┬─ a ─── a1 ─── a2
    ///       └─ b
    fn sample() -> Group {
        let a2 = group("a2", "A2", vec![], vec![entry("e3", "Deep")]);
        let a1 = group("a1", "A1", vec![a2], vec![]);
        let a = group("a", "A", vec![a1], vec![entry("e1", "GitHub")]);
        let b = group("b", "B", vec![], vec![entry("e2", "Bank")]);
        group("root", "All Entries", vec![a, b], vec![])
    }

    #[test]
    fn cycle_and_self_moves_are_rejected() {
        let mut root = sample();
        let before = root.clone();

        assert!(!move_group(&mut root, "a", "a"));
        assert!(!move_group(&mut root, "a", "a1"));
        assert!(!move_group(&mut root, "a", "a2"));
        assert!(!move_group(&mut root, "root", "b"));
        assert!(!move_group(&mut root, "a", "missing"));
        assert_eq!(root, before);
    }

    #[test]
    fn group_move_appends_to_destination() {
        let mut root = sample();

        assert!(move_group(&mut root, "a1", "b"));
        assert!(find_group(&root, "a").unwrap().children.is_empty());
        let b = find_group(&root, "b").unwrap();
        assert_eq!(b.children.last().unwrap().uuid, "a1");
        assert_eq!(b.children[0].children[0].uuid, "a2");
        assert_eq!(count_entries(&root), 3);
    }

    #[test]
    fn entry_move_keeps_identity() {
        let mut root = sample();

        assert!(move_entry(&mut root, "e1", "b"));
        assert!(find_group(&root, "a").unwrap().entries.is_empty());
        let b = find_group(&root, "b").unwrap();
        assert_eq!(b.entries.len(), 2);
        assert_eq!(b.entries[1].uuid, "e1");
        assert_eq!(b.entries[1].title, "GitHub");
    }

    #[test]
    fn entry_move_to_same_group_is_noop() {
        let mut root = sample();
        let before = root.clone();
        assert!(!move_entry(&mut root, "e1", "a"));
        assert!(!move_entry(&mut root, "missing", "b"));
        assert!(!move_entry(&mut root, "e1", "missing"));
        assert_eq!(root, before);
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut root = sample();
        assert!(!remove_group(&mut root, "root"));
        assert!(remove_group(&mut root, "a1"));
        assert!(find_group(&root, "a2").is_none());
        assert_eq!(count_entries(&root), 2);
    }

    #[test]
    fn rename_only_touches_name() {
        let mut root = sample();
        assert!(rename_group(&mut root, "a", "Work"));
        let a = find_group(&root, "a").unwrap();
        assert_eq!(a.name, "Work");
        assert_eq!(a.children.len(), 1);
        assert!(!rename_group(&mut root, "missing", "x"));
    }

    #[test]
    fn all_entries_is_entries_before_subgroups() {
        let root = sample();
        let ids: Vec<_> = all_entries(&root).iter().map(|e| e.uuid.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e3", "e2"]);
    }

    #[test]
    fn upsert_replaces_or_appends() {
        let mut root = sample();
        let mut edited = entry("e2", "Bank (new)");
        edited.username = "me".to_string();
        upsert_entry(&mut root, edited, "a");
        let (parent, found) = find_entry_and_group(&root, "e2").unwrap();
        assert_eq!(parent.uuid, "b");
        assert_eq!(found.title, "Bank (new)");

        upsert_entry(&mut root, entry("", "Fresh"), "a2");
        assert_eq!(find_group(&root, "a2").unwrap().entries.len(), 2);

        upsert_entry(&mut root, entry("", "Orphan"), "missing");
        assert_eq!(root.entries.len(), 1);
    }

    #[test]
    fn search_ranks_and_reports_paths() {
        let root = sample();
        let results = search_entries(&root, "github", 10);
        assert_eq!(results[0].entry.uuid, "e1");
        assert_eq!(results[0].path, "All Entries / A");
        assert_eq!(results[0].group_uuid, "a");
        assert!(search_entries(&root, "   ", 10).is_empty());
    }
}
