//! Rate-limited, cache-first breach scanning.

use super::email_cache::EmailStatusCache;
use super::error::{BreachError, Result};
use super::hibp::BreachLookup;
use super::progress::{CancelSignal, Progress, ProgressNotice, ScanKind, ScanProgress};
use super::status_cache::StatusCache;
use super::strength::StrengthEvaluator;
use super::types::{BreachStatus, EmailBreachStatus};
use crate::models::{is_well_formed_id, Entry, Group};
use crate::tree;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Whether `value` looks like an email address.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Minimum spacing between external calls.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub password_interval: Duration,
    pub email_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            password_interval: Duration::from_millis(1500),
            email_interval: Duration::from_millis(6000),
        }
    }
}

/// Whether a group scan owns the progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanScope {
    /// Top-level scan: resets counters, publishes progress, single-flight.
    Root,
    /// Part of a larger scan, or an ad-hoc check of one group.
    Subtree,
}

/// Cache-only view of password findings.
#[derive(Debug, Clone, Default)]
pub struct BreachReport {
    pub breached: Vec<Entry>,
    pub weak: Vec<Entry>,
    pub has_checked_entries: bool,
    pub all_entries_cached: bool,
}

/// Cache-only view of email findings.
#[derive(Debug, Clone, Default)]
pub struct EmailBreachReport {
    pub breached: Vec<Entry>,
    pub has_checked_emails: bool,
    pub all_emails_cached: bool,
}

/// Hands out call slots at least `interval` apart.
struct RateGate {
    interval: Duration,
    next_free: Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_free: Mutex::new(None),
        }
    }

    /// Claim the earliest free slot. A claimed slot is spent even if the
    /// caller never makes its call.
    fn reserve(&self) -> Instant {
        let mut next_free = self.next_free.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = match *next_free {
            Some(free) if free > now => free,
            _ => now,
        };
        *next_free = Some(slot + self.interval);
        slot
    }
}

#[derive(Default)]
struct KindState {
    progress: Progress,
    counted: HashSet<String>,
}

#[derive(Default)]
struct ScanState {
    passwords: KindState,
    emails: KindState,
}

impl ScanState {
    fn kind_mut(&mut self, kind: ScanKind) -> &mut KindState {
        match kind {
            ScanKind::Password => &mut self.passwords,
            ScanKind::Email => &mut self.emails,
        }
    }

    fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            passwords: self.passwords.progress,
            emails: self.emails.progress,
        }
    }
}

/// Releases the single-flight flag of a root scan when dropped.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool, kind: ScanKind) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(BreachError::ScanInProgress(kind.label()));
        }
        Ok(Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-kind rate gate, cancellation signal and single-flight flag.
struct Lane {
    gate: RateGate,
    cancel: CancelSignal,
    active: AtomicBool,
}

impl Lane {
    fn new(interval: Duration) -> Self {
        Self {
            gate: RateGate::new(interval),
            cancel: CancelSignal::new(),
            active: AtomicBool::new(false),
        }
    }
}

/// Checks credentials against breach services, caching every answer.
///
/// One instance owns all scan state. Share it behind an `Arc`; every method
/// takes `&self`. Root scans of the same kind are single-flight.
pub struct BreachOrchestrator {
    lookup: Arc<dyn BreachLookup>,
    strength: Arc<dyn StrengthEvaluator>,
    status_cache: Arc<StatusCache>,
    email_cache: Arc<EmailStatusCache>,
    passwords: Lane,
    emails: Lane,
    state: Mutex<ScanState>,
    notices: watch::Sender<ProgressNotice>,
}

impl BreachOrchestrator {
    pub fn new(
        lookup: Arc<dyn BreachLookup>,
        strength: Arc<dyn StrengthEvaluator>,
        status_cache: Arc<StatusCache>,
        email_cache: Arc<EmailStatusCache>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (notices, _rx) = watch::channel(ProgressNotice::Idle);
        Self {
            lookup,
            strength,
            status_cache,
            email_cache,
            passwords: Lane::new(settings.password_interval),
            emails: Lane::new(settings.email_interval),
            state: Mutex::new(ScanState::default()),
            notices,
        }
    }

    /// Receiver of the progress notification, updated in place.
    pub fn subscribe(&self) -> watch::Receiver<ProgressNotice> {
        self.notices.subscribe()
    }

    /// Current counters of both scan kinds.
    pub fn progress(&self) -> ScanProgress {
        self.lock_state().snapshot()
    }

    /// Ask running root scans to stop before their next wait or lookup.
    pub fn cancel(&self) {
        for lane in [&self.passwords, &self.emails] {
            if lane.active.load(Ordering::Acquire) {
                lane.cancel.cancel();
            }
        }
    }

    /// Forget every cached result of one container.
    pub fn clear_cache(&self, container: &str) {
        self.status_cache.clear_container(container);
        self.email_cache.clear_container(container);
    }

    /// Check one entry's password, from cache when possible.
    ///
    /// Cache hits return immediately. Misses wait for the password rate
    /// gate, query the range API and cache the result together with a
    /// strength estimate. Failed lookups are counted but not cached.
    /// Entries that have not been saved yet have no id and are never cached.
    pub async fn check_entry(&self, container: &str, entry: &Entry) -> Result<bool> {
        let cacheable = is_well_formed_id(&entry.uuid);
        if cacheable {
            if let Some(status) = self.status_cache.get(container, &entry.uuid) {
                tracing::debug!("Password status of '{}' served from cache", entry.title);
                self.count(ScanKind::Password, &entry.uuid);
                return Ok(status.is_pwned);
            }
        }

        let result = self.lookup_password(container, entry, cacheable).await;
        self.count(ScanKind::Password, &entry.uuid);
        result
    }

    async fn lookup_password(&self, container: &str, entry: &Entry, cacheable: bool) -> Result<bool> {
        self.wait_turn(&self.passwords).await?;

        let pwned = self.lookup.check_password(&entry.password).await?;

        if cacheable {
            let strength = self.strength.evaluate(&entry.password);
            let breached_email = self.cached_email_breach(container, entry);
            self.status_cache.set(
                container,
                &entry.uuid,
                BreachStatus::new(pwned, strength, breached_email),
            );
        } else {
            tracing::debug!("Not caching password status of unsaved entry '{}'", entry.title);
        }

        if pwned.is_pwned {
            tracing::info!("Password of '{}' appears in {} breaches", entry.title, pwned.count);
        }
        Ok(pwned.is_pwned)
    }

    /// Check the email stored as an entry's username.
    ///
    /// Entries without a valid email are counted and skipped. Returns whether
    /// any breach of that address postdates the entry's last modification.
    pub async fn check_entry_email(&self, container: &str, entry: &Entry) -> Result<bool> {
        let email = entry.username.trim();
        if !is_valid_email(email) || !self.lookup.email_lookups_enabled() {
            self.count(ScanKind::Email, &entry.uuid);
            return Ok(false);
        }

        if let Some(status) = self.cached_email_status(container, entry, email) {
            tracing::debug!("Email status of '{}' served from cache", entry.title);
            self.count(ScanKind::Email, &entry.uuid);
            return Ok(status.has_relevant_breach(entry.modified));
        }

        let result = self.lookup_email(container, entry, email).await;
        self.count(ScanKind::Email, &entry.uuid);
        result
    }

    async fn lookup_email(&self, container: &str, entry: &Entry, email: &str) -> Result<bool> {
        self.wait_turn(&self.emails).await?;

        let status = EmailBreachStatus::new(self.lookup.check_email(email).await?);

        let breached = status.has_relevant_breach(entry.modified);
        if is_well_formed_id(&entry.uuid) {
            self.email_cache
                .set_for_entry(container, &entry.uuid, email, status);
        } else {
            self.email_cache.set_for_email(container, email, status);
        }
        Ok(breached)
    }

    /// Check every password in `group`, entries before subgroups, depth first.
    ///
    /// Failures of single entries are logged and skipped. Returns whether any
    /// password is known to be breached.
    pub async fn check_group(&self, container: &str, group: &Group, scope: ScanScope) -> Result<bool> {
        self.scan(ScanKind::Password, container, group, scope).await
    }

    /// Email counterpart of [`check_group`](Self::check_group).
    pub async fn check_group_emails(&self, container: &str, group: &Group, scope: ScanScope) -> Result<bool> {
        self.scan(ScanKind::Email, container, group, scope).await
    }

    async fn scan(&self, kind: ScanKind, container: &str, group: &Group, scope: ScanScope) -> Result<bool> {
        let entries = tree::all_entries(group);
        if scope == ScanScope::Subtree {
            return self.scan_entries(kind, container, &entries).await;
        }

        let lane = self.lane(kind);
        let _guard = ScanGuard::acquire(&lane.active, kind)?;
        lane.cancel.reset();

        tracing::info!("Starting {} breach scan of {} entries", kind.label(), entries.len());
        self.begin(kind, entries.len());

        let result = self.scan_entries(kind, container, &entries).await;

        self.finish(kind, &result);
        lane.cancel.reset();
        result
    }

    async fn scan_entries(&self, kind: ScanKind, container: &str, entries: &[&Entry]) -> Result<bool> {
        let mut any_breached = false;
        for entry in entries {
            let checked = match kind {
                ScanKind::Password => self.check_entry(container, entry).await,
                ScanKind::Email => self.check_entry_email(container, entry).await,
            };
            match checked {
                Ok(breached) => any_breached |= breached,
                Err(BreachError::Cancelled) => return Err(BreachError::Cancelled),
                Err(e) => {
                    tracing::warn!("Failed to check {} of '{}': {}", kind.label(), entry.title, e)
                }
            }
        }
        Ok(any_breached)
    }

    /// Cache-only summary of breached and weak passwords under `root`.
    pub fn find_breached_and_weak_entries(&self, container: &str, root: &Group) -> BreachReport {
        let mut report = BreachReport {
            all_entries_cached: true,
            ..BreachReport::default()
        };

        for entry in tree::all_entries(root) {
            let cached = if is_well_formed_id(&entry.uuid) {
                self.status_cache.get(container, &entry.uuid)
            } else {
                None
            };
            let Some(status) = cached else {
                report.all_entries_cached = false;
                continue;
            };
            report.has_checked_entries = true;
            if status.is_pwned {
                report.breached.push(entry.clone());
            }
            if status.strength.is_weak() {
                report.weak.push(entry.clone());
            }
        }

        report
    }

    /// Cache-only summary of entries whose email has a relevant breach.
    pub fn find_breached_emails(&self, container: &str, root: &Group) -> EmailBreachReport {
        let mut report = EmailBreachReport {
            all_emails_cached: true,
            ..EmailBreachReport::default()
        };

        for entry in tree::all_entries(root) {
            let email = entry.username.trim();
            if !is_valid_email(email) {
                continue;
            }
            let Some(status) = self.cached_email_status(container, entry, email) else {
                report.all_emails_cached = false;
                continue;
            };
            report.has_checked_emails = true;
            if status.has_relevant_breach(entry.modified) {
                report.breached.push(entry.clone());
            }
        }

        report
    }

    fn cached_email_breach(&self, container: &str, entry: &Entry) -> Option<bool> {
        let email = entry.username.trim();
        if !is_valid_email(email) {
            return None;
        }
        self.cached_email_status(container, entry, email)
            .map(|status| status.has_relevant_breach(entry.modified))
    }

    /// Unsaved entries have no index row and only see the shared email row.
    fn cached_email_status(&self, container: &str, entry: &Entry, email: &str) -> Option<EmailBreachStatus> {
        if is_well_formed_id(&entry.uuid) {
            self.email_cache.get_by_entry(container, &entry.uuid, email)
        } else {
            self.email_cache.get_by_email(container, email)
        }
    }

    /// Honour cancellation and the lane's minimum spacing before an external call.
    async fn wait_turn(&self, lane: &Lane) -> Result<()> {
        if lane.cancel.is_cancelled() {
            return Err(BreachError::Cancelled);
        }
        let slot = lane.gate.reserve();
        if slot > Instant::now() {
            tokio::select! {
                _ = tokio::time::sleep_until(slot) => {}
                _ = lane.cancel.cancelled() => return Err(BreachError::Cancelled),
            }
        }
        if lane.cancel.is_cancelled() {
            return Err(BreachError::Cancelled);
        }
        Ok(())
    }

    fn lane(&self, kind: ScanKind) -> &Lane {
        match kind {
            ScanKind::Password => &self.passwords,
            ScanKind::Email => &self.emails,
        }
    }

    fn begin(&self, kind: ScanKind, total: usize) {
        let line = {
            let mut state = self.lock_state();
            let lane = state.kind_mut(kind);
            lane.counted.clear();
            lane.progress = Progress { checked: 0, total };
            state.snapshot().line()
        };
        if let Some(line) = line {
            self.notices.send_replace(ProgressNotice::Running(line));
        }
    }

    /// Count one checked entry. Saved entries count once per scan; unsaved
    /// ones share the empty id and count every time.
    fn count(&self, kind: ScanKind, entry_id: &str) {
        let line = {
            let mut state = self.lock_state();
            let lane = state.kind_mut(kind);
            if is_well_formed_id(entry_id) && !lane.counted.insert(entry_id.to_string()) {
                return;
            }
            lane.progress.checked += 1;
            state.snapshot().line()
        };
        if let Some(line) = line {
            self.notices.send_replace(ProgressNotice::Running(line));
        }
    }

    fn finish(&self, kind: ScanKind, result: &Result<bool>) {
        let snapshot = {
            let mut state = self.lock_state();
            *state.kind_mut(kind) = KindState::default();
            state.snapshot()
        };

        let notice = match result {
            Ok(_) => {
                tracing::info!("Finished {} breach scan", kind.label());
                match snapshot.line() {
                    Some(line) => ProgressNotice::Running(line),
                    None => ProgressNotice::Completed("Completed checking for breaches".to_string()),
                }
            }
            Err(BreachError::Cancelled) => {
                tracing::info!("Cancelled {} breach scan", kind.label());
                ProgressNotice::Cancelled(format!("Cancelled checking {}s for breaches", kind.label()))
            }
            Err(e) => {
                tracing::error!("{} breach scan failed: {}", kind.label(), e);
                ProgressNotice::Failed(format!("Error checking {}s for breaches", kind.label()))
            }
        };
        self.notices.send_replace(notice);
    }

    fn lock_state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
