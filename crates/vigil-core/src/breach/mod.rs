//! Breach and strength intelligence for stored credentials.
//!
//! [`BreachOrchestrator`] drives the scans; the two caches keep answers for
//! 24 hours so that warnings can be shown without touching the network.

pub mod email_cache;
pub mod error;
pub mod hibp;
pub mod orchestrator;
mod persist;
pub mod progress;
pub mod status_cache;
pub mod strength;
pub mod types;

pub use email_cache::EmailStatusCache;
pub use error::BreachError;
pub use hibp::{BreachLookup, HibpClient};
pub use orchestrator::{
    is_valid_email, BreachOrchestrator, BreachReport, EmailBreachReport, OrchestratorSettings,
    ScanScope,
};
pub use progress::{Progress, ProgressNotice, ScanKind, ScanProgress};
pub use status_cache::StatusCache;
pub use strength::{StrengthEvaluator, ZxcvbnEvaluator};
pub use types::{BreachRecord, BreachStatus, EmailBreachStatus, PasswordStrength, PwnedPassword};
