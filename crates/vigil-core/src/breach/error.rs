use thiserror::Error;

/// Errors raised while checking credentials against breach services.
#[derive(Debug, Error)]
pub enum BreachError {
    #[error("breach lookup request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("breach lookup returned HTTP {status}")]
    Status { status: u16 },

    #[error("invalid breach service URL: {0}")]
    Url(String),

    #[error("scan was cancelled")]
    Cancelled,

    #[error("a {0} scan is already running")]
    ScanInProgress(&'static str),
}

pub type Result<T> = std::result::Result<T, BreachError>;
