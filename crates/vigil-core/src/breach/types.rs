//! Breach and strength status types, as cached and as returned by HIBP.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Strength estimate for a password. `score` ranges from 0 (weak) to 4 (strong).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStrength {
    pub score: u8,
    pub warning: String,
    pub suggestions: Vec<String>,
}

/// Scores below this are reported as weak.
pub const WEAK_SCORE_THRESHOLD: u8 = 3;

impl PasswordStrength {
    pub fn is_weak(&self) -> bool {
        self.score < WEAK_SCORE_THRESHOLD
    }
}

/// Result of a k-anonymity range query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PwnedPassword {
    pub is_pwned: bool,
    pub count: u64,
}

/// Cached breach and strength status of one entry's password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreachStatus {
    pub is_pwned: bool,
    pub count: u64,
    pub strength: PasswordStrength,
    /// Write time; rows expire 24h after it.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breached_email: Option<bool>,
}

impl BreachStatus {
    /// Status stamped with the current time.
    pub fn new(pwned: PwnedPassword, strength: PasswordStrength, breached_email: Option<bool>) -> Self {
        Self {
            is_pwned: pwned.is_pwned,
            count: pwned.count,
            strength,
            timestamp: Utc::now(),
            breached_email,
        }
    }
}

/// One breach as described by the HIBP v3 API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BreachRecord {
    pub name: String,
    pub title: String,
    pub domain: String,
    pub breach_date: String,
    pub added_date: String,
    pub modified_date: String,
    pub pwn_count: u64,
    pub description: String,
    pub data_classes: Vec<String>,
    pub is_verified: bool,
    pub is_fabricated: bool,
    pub is_sensitive: bool,
    pub is_retired: bool,
    pub is_spam_list: bool,
    pub is_malware: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
}

impl BreachRecord {
    /// Start of the breach day, if `breach_date` is a valid `YYYY-MM-DD` date.
    pub fn breached_at(&self) -> Option<NaiveDateTime> {
        NaiveDate::parse_from_str(&self.breach_date, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }

    /// Whether the breach happened after the credential was last changed.
    ///
    /// Breaches predating the last modification are assumed to have been
    /// handled by rotating the secret. Undatable breaches are not relevant.
    pub fn is_relevant_since(&self, modified: NaiveDateTime) -> bool {
        self.breached_at().is_some_and(|at| at > modified)
    }
}

/// Cached breach list for one email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailBreachStatus {
    pub breaches: Vec<BreachRecord>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl EmailBreachStatus {
    /// Status stamped with the current time.
    pub fn new(breaches: Vec<BreachRecord>) -> Self {
        Self {
            breaches,
            timestamp: Utc::now(),
        }
    }

    /// Whether any cached breach postdates `modified`.
    pub fn has_relevant_breach(&self, modified: NaiveDateTime) -> bool {
        self.breaches.iter().any(|b| b.is_relevant_since(modified))
    }
}
