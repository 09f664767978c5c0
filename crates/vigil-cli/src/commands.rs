//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use vigil_core::breach::{
    BreachOrchestrator, EmailStatusCache, HibpClient, ProgressNotice, ScanScope, StatusCache,
    StrengthEvaluator, ZxcvbnEvaluator,
};
use vigil_core::generator::{self, GeneratorOptions};
use vigil_core::models::{Entry, Group};
use vigil_core::{import, tree, KeepassDatabase};

use crate::config::Config;

/// An unlocked database plus everything needed to scan it.
pub struct Session {
    db: KeepassDatabase,
    /// Cache key of this database, its canonical path.
    container: String,
    config: Config,
}

impl Session {
    pub fn open(config: &Config, password: &str) -> Result<Self> {
        let mut db = KeepassDatabase::unlock(&config.database_path, password)?;
        if let Some(dir) = &config.fallback_save_dir {
            db = db.with_fallback_dir(dir);
        }

        let container = std::fs::canonicalize(&config.database_path)
            .unwrap_or_else(|_| config.database_path.clone())
            .display()
            .to_string();

        Ok(Self {
            db,
            container,
            config: config.clone(),
        })
    }

    /// Apply one structural edit to the tree and save the database.
    pub fn edit(&mut self, what: &str, apply: impl FnOnce(&mut Group) -> bool) -> Result<()> {
        let mut root = self.db.root_group();
        if !apply(&mut root) {
            bail!("Could not {what}: unknown id or invalid target");
        }

        self.db.apply_tree(&mut root);
        let written = self.db.save()?;

        tracing::info!("Applied {what}");
        println!("Saved {}", written.display());
        Ok(())
    }

    fn orchestrator(&self) -> Result<BreachOrchestrator> {
        let cache_dir = self.config.cache_dir()?;
        let status_cache = StatusCache::open(cache_dir.join("breach_status.json"));
        let email_cache = EmailStatusCache::open(cache_dir.join("email_breach_status.json"));

        let client = HibpClient::new(self.config.hibp_api_key.clone()).with_endpoints(
            self.config.range_api_url.clone(),
            self.config.breach_api_url.clone(),
        );

        Ok(BreachOrchestrator::new(
            Arc::new(client),
            Arc::new(ZxcvbnEvaluator),
            Arc::new(status_cache),
            Arc::new(email_cache),
            self.config.orchestrator_settings(),
        ))
    }
}

/// Resolve the `root` alias to the root group's id.
pub fn resolve_group_id(root: &Group, id: &str) -> String {
    if id.eq_ignore_ascii_case("root") {
        root.uuid.clone()
    } else {
        id.to_string()
    }
}

pub fn print_tree(session: &Session, ids: bool) {
    let root = session.db.root_group();
    let mut out = String::new();
    render_group(&root, 0, ids, &mut out);
    print!("{out}");
}

fn render_group(group: &Group, depth: usize, ids: bool, out: &mut String) {
    let indent = "  ".repeat(depth);
    let count = tree::count_entries(group);
    if ids {
        out.push_str(&format!("{indent}{}/ ({count}) [{}]\n", group.name, group.uuid));
    } else {
        out.push_str(&format!("{indent}{}/ ({count})\n", group.name));
    }

    for entry in &group.entries {
        out.push_str(&format!("{indent}  {}", entry_label(entry)));
        if ids {
            out.push_str(&format!(" [{}]", entry.uuid));
        }
        out.push('\n');
    }
    for child in &group.children {
        render_group(child, depth + 1, ids, out);
    }
}

fn entry_label(entry: &Entry) -> String {
    if entry.username.is_empty() {
        entry.title.clone()
    } else {
        format!("{} ({})", entry.title, entry.username)
    }
}

pub fn search(session: &Session, query: &str, limit: usize) {
    let root = session.db.root_group();
    let results = tree::search_entries(&root, query, limit);
    if results.is_empty() {
        println!("No matches for '{query}'");
        return;
    }
    for result in results {
        println!("{}  {}  [{}]", result.path, entry_label(&result.entry), result.entry.uuid);
    }
}

/// Run a root scan of passwords, and of emails when asked, printing progress to stderr.
pub async fn scan(session: &Session, emails: bool) -> Result<()> {
    let orchestrator = session.orchestrator()?;
    let root = session.db.root_group();

    if emails && session.config.hibp_api_key.is_none() {
        tracing::warn!("No HIBP API key configured; email addresses will not be checked");
    }

    let printer = tokio::spawn(follow_notices(orchestrator.subscribe(), |line| eprintln!("{line}")));

    let container = session.container.as_str();
    let (passwords, email_result) = tokio::join!(
        orchestrator.check_group(container, &root, ScanScope::Root),
        async {
            if emails {
                Some(orchestrator.check_group_emails(container, &root, ScanScope::Root).await)
            } else {
                None
            }
        }
    );

    // Closing the notice channel lets the printer finish after the last notice
    drop(orchestrator);
    printer.await?;

    passwords?;
    if let Some(result) = email_result {
        result?;
    }

    report(session)
}

/// Hand every notice line to `print` until the orchestrator goes away.
async fn follow_notices(mut notices: watch::Receiver<ProgressNotice>, mut print: impl FnMut(String)) {
    while notices.changed().await.is_ok() {
        let notice = notices.borrow_and_update().clone();
        match notice {
            ProgressNotice::Running(line)
            | ProgressNotice::Completed(line)
            | ProgressNotice::Cancelled(line)
            | ProgressNotice::Failed(line) => print(line),
            ProgressNotice::Idle => {}
        }
    }
}

pub fn report(session: &Session) -> Result<()> {
    let orchestrator = session.orchestrator()?;
    let root = session.db.root_group();
    print_report(session, &orchestrator, &root);
    Ok(())
}

fn print_report(session: &Session, orchestrator: &BreachOrchestrator, root: &Group) {
    let container = session.container.as_str();
    let passwords = orchestrator.find_breached_and_weak_entries(container, root);

    if !passwords.has_checked_entries {
        println!("No entries checked yet. Run `vigil scan` first.");
    } else {
        print_entries("Breached passwords", &passwords.breached);
        print_entries("Weak passwords", &passwords.weak);
        if !passwords.all_entries_cached {
            println!("Some entries have not been checked in the last 24 hours.");
        }
    }

    let emails = orchestrator.find_breached_emails(container, root);
    if emails.has_checked_emails {
        print_entries("Emails breached since last password change", &emails.breached);
        if !emails.all_emails_cached {
            println!("Some email addresses have not been checked in the last 24 hours.");
        }
    }
}

fn print_entries(heading: &str, entries: &[Entry]) {
    println!("{heading}: {}", entries.len());
    for entry in entries {
        println!("  {}", entry_label(entry));
    }
}

pub fn clear_cache(session: &Session, all: bool) -> Result<()> {
    if all {
        let cache_dir = session.config.cache_dir()?;
        StatusCache::open(cache_dir.join("breach_status.json")).clear_all();
        EmailStatusCache::open(cache_dir.join("email_breach_status.json")).clear_all();
        println!("Cleared all breach caches");
    } else {
        session.orchestrator()?.clear_cache(&session.container);
        println!("Cleared breach cache for {}", session.container);
    }
    Ok(())
}

pub fn import_csv(session: &mut Session, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;
    let credentials = import::parse_csv(&text)
        .with_context(|| format!("Failed to import {}", path.display()))?;

    let mut added = 0;
    session.edit("import CSV", |root| {
        added = import::import_into(root, credentials);
        added > 0
    })?;
    println!("Imported {added} entries into '{}'", import::IMPORTED_GROUP_NAME);
    Ok(())
}

pub fn generate(options: &GeneratorOptions) -> Result<()> {
    let password = generator::generate(options)?;
    println!("{password}");
    eprintln!("Strength: {}", strength_label(&password));
    Ok(())
}

/// Give an entry a fresh password drawn from the character sets it already uses.
pub fn set_password(session: &mut Session, entry_uuid: &str, length: Option<usize>) -> Result<()> {
    let current = session
        .db
        .find_entry(entry_uuid)
        .with_context(|| format!("No entry with id {entry_uuid}"))?;

    let mut options = GeneratorOptions::matching(&current.password);
    if let Some(length) = length {
        options.length = length;
    }
    let password = generator::generate(&options)?;
    let label = strength_label(&password);

    session.edit("set password", |root| replace_password(root, entry_uuid, password))?;
    println!("New password for '{}' ({label})", current.title);
    Ok(())
}

fn replace_password(root: &mut Group, entry_uuid: &str, password: String) -> bool {
    let Some((group, existing)) = tree::find_entry_and_group(root, entry_uuid) else {
        return false;
    };
    let group_uuid = group.uuid.clone();
    let mut updated = existing.clone();
    updated.password = password;
    updated.touch();
    tree::upsert_entry(root, updated, &group_uuid);
    true
}

fn strength_label(password: &str) -> &'static str {
    match ZxcvbnEvaluator.evaluate(password).score {
        0 => "very weak",
        1 => "weak",
        2 => "fair",
        3 => "strong",
        _ => "very strong",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Group {
        let mut root = Group::new("All Entries");
        root.uuid = "r".repeat(32);

        let mut mail = Entry::new();
        mail.title = "Mail".to_string();
        mail.username = "me@example.com".to_string();
        root.entries.push(mail);

        let mut work = Group::new("Work");
        work.uuid = "w".repeat(32);
        let mut vpn = Entry::new();
        vpn.title = "VPN".to_string();
        work.entries.push(vpn);
        root.children.push(work);

        root
    }

    #[tokio::test]
    async fn final_notice_is_printed_before_the_printer_stops() {
        let (tx, rx) = watch::channel(ProgressNotice::Idle);
        let lines = Arc::new(std::sync::Mutex::new(Vec::new()));
        let printer = tokio::spawn(follow_notices(rx, {
            let lines = lines.clone();
            move |line| lines.lock().unwrap().push(line)
        }));

        tx.send_replace(ProgressNotice::Running("Checking for breaches: passwords 1/2".to_string()));
        tx.send_replace(ProgressNotice::Completed("Completed checking for breaches".to_string()));
        drop(tx);
        printer.await.unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(lines.last().map(String::as_str), Some("Completed checking for breaches"));
    }

    #[test]
    fn replaced_password_keeps_entry_in_place() {
        let mut root = sample_tree();
        let mut vpn = root.children[0].entries[0].clone();
        vpn.uuid = "e".repeat(32);
        root.children[0].entries[0] = vpn.clone();

        assert!(replace_password(&mut root, &vpn.uuid, "n3w-secret".to_string()));

        let (group, updated) = tree::find_entry_and_group(&root, &vpn.uuid).unwrap();
        assert_eq!(group.name, "Work");
        assert_eq!(updated.password, "n3w-secret");
        assert!(updated.modified >= vpn.modified);
        assert_eq!(group.entries.len(), 1);

        assert!(!replace_password(&mut root, "missing", "x".to_string()));
    }

    #[test]
    fn strength_labels_follow_score() {
        assert_eq!(strength_label(""), "very weak");
        assert_eq!(strength_label("vR7#qL!z9@Wm2$Xp5&Tn"), "very strong");
    }

    #[test]
    fn root_alias_resolves_to_root_id() {
        let root = sample_tree();
        assert_eq!(resolve_group_id(&root, "root"), root.uuid);
        assert_eq!(resolve_group_id(&root, "ROOT"), root.uuid);
        assert_eq!(resolve_group_id(&root, "abc"), "abc");
    }

    #[test]
    fn tree_rendering_indents_subgroups() {
        let root = sample_tree();
        let mut out = String::new();
        render_group(&root, 0, false, &mut out);

        assert_eq!(
            out,
            "All Entries/ (2)\n  Mail (me@example.com)\n  Work/ (1)\n    VPN\n"
        );
    }
}
