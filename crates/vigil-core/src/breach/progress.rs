//! Scan progress notifications and cancellation.

use tokio::sync::watch;

/// Which lookup a scan performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Password,
    Email,
}

impl ScanKind {
    pub fn label(self) -> &'static str {
        match self {
            ScanKind::Password => "password",
            ScanKind::Email => "email",
        }
    }
}

/// Checked/total counters of one scan kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub checked: usize,
    pub total: usize,
}

/// Counters of both scan kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub passwords: Progress,
    pub emails: Progress,
}

impl ScanProgress {
    pub fn is_idle(&self) -> bool {
        self.passwords.total == 0 && self.emails.total == 0
    }

    /// One human-readable line covering both kinds, or `None` when nothing is scanning.
    pub fn line(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.passwords.total > 0 {
            parts.push(format!(
                "passwords {}/{}",
                self.passwords.checked, self.passwords.total
            ));
        }
        if self.emails.total > 0 {
            parts.push(format!("emails {}/{}", self.emails.checked, self.emails.total));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("Checking for breaches: {}", parts.join(", ")))
        }
    }
}

/// The single persistent notification a scan keeps updating in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProgressNotice {
    #[default]
    Idle,
    Running(String),
    Completed(String),
    Cancelled(String),
    Failed(String),
}

/// Cancellation flag that async waits can race against.
pub struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn line_covers_active_kinds_only() {
        let mut progress = ScanProgress::default();
        assert_eq!(progress.line(), None);
        assert!(progress.is_idle());

        progress.passwords = Progress { checked: 2, total: 10 };
        assert_eq!(
            progress.line().as_deref(),
            Some("Checking for breaches: passwords 2/10")
        );

        progress.emails = Progress { checked: 1, total: 4 };
        assert_eq!(
            progress.line().as_deref(),
            Some("Checking for breaches: passwords 2/10, emails 1/4")
        );
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        let waited = tokio::time::timeout(Duration::from_millis(10), signal.cancelled()).await;
        assert!(waited.is_err());

        signal.cancel();
        tokio::time::timeout(Duration::from_millis(10), signal.cancelled())
            .await
            .unwrap();

        signal.reset();
        assert!(!signal.is_cancelled());
    }
}
