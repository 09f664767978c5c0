//! Have I Been Pwned lookups.
//!
//! Passwords are checked with the k-anonymity range API: only the first five
//! hex characters of the SHA-1 hash leave the machine. Email checks use the
//! authenticated breached-account API and need a user-supplied API key.

use super::error::{BreachError, Result};
use super::types::{BreachRecord, PwnedPassword};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use sha1::{Digest, Sha1};

pub const DEFAULT_RANGE_API_URL: &str = "https://api.pwnedpasswords.com";
pub const DEFAULT_BREACH_API_URL: &str = "https://haveibeenpwned.com/api/v3";
const USER_AGENT: &str = "Vigil Password Manager";

/// External breach lookup service.
#[async_trait]
pub trait BreachLookup: Send + Sync {
    /// Check a password against the range API.
    async fn check_password(&self, password: &str) -> Result<PwnedPassword>;

    /// List the breaches an email address appears in.
    async fn check_email(&self, email: &str) -> Result<Vec<BreachRecord>>;

    /// Whether email lookups can reach the service at all.
    fn email_lookups_enabled(&self) -> bool {
        true
    }
}

/// HTTP client for the HIBP APIs.
pub struct HibpClient {
    http: reqwest::Client,
    range_api_url: String,
    breach_api_url: String,
    api_key: Option<String>,
}

impl HibpClient {
    /// Client for the public HIBP endpoints. Without an API key email checks return nothing.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            range_api_url: DEFAULT_RANGE_API_URL.to_string(),
            breach_api_url: DEFAULT_BREACH_API_URL.to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Point the client at other endpoints (mirrors, test servers).
    pub fn with_endpoints(mut self, range_api_url: impl Into<String>, breach_api_url: impl Into<String>) -> Self {
        self.range_api_url = range_api_url.into();
        self.breach_api_url = breach_api_url.into();
        self
    }

    fn breached_account_url(&self, email: &str) -> Result<Url> {
        let mut url = Url::parse(&self.breach_api_url).map_err(|e| BreachError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BreachError::Url(self.breach_api_url.clone()))?
            .pop_if_empty()
            .push("breachedaccount")
            .push(email);
        url.query_pairs_mut().append_pair("truncateResponse", "false");
        Ok(url)
    }
}

#[async_trait]
impl BreachLookup for HibpClient {
    async fn check_password(&self, password: &str) -> Result<PwnedPassword> {
        let (prefix, suffix) = hash_parts(password);
        let url = format!("{}/range/{}", self.range_api_url.trim_end_matches('/'), prefix);

        let response = self.http.get(&url).header("User-Agent", USER_AGENT).send().await?;
        if !response.status().is_success() {
            return Err(BreachError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(match_suffix(&body, &suffix))
    }

    async fn check_email(&self, email: &str) -> Result<Vec<BreachRecord>> {
        let Some(api_key) = &self.api_key else {
            return Ok(Vec::new());
        };

        let url = self.breached_account_url(email)?;
        let response = self
            .http
            .get(url)
            .header("hibp-api-key", api_key)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            StatusCode::OK => Ok(response.json().await?),
            status => Err(BreachError::Status {
                status: status.as_u16(),
            }),
        }
    }

    fn email_lookups_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Uppercase SHA-1 of `password`, split into the 5 character prefix sent to the
/// server and the 35 character suffix matched locally.
pub fn hash_parts(password: &str) -> (String, String) {
    let hash = hex::encode_upper(Sha1::digest(password.as_bytes()));
    let (prefix, suffix) = hash.split_at(5);
    (prefix.to_string(), suffix.to_string())
}

/// Find `suffix` in a range response of `SUFFIX:COUNT` lines.
fn match_suffix(body: &str, suffix: &str) -> PwnedPassword {
    body.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(suffix))
        .map(|(_, count)| PwnedPassword {
            is_pwned: true,
            count: count.trim().parse().unwrap_or(0),
        })
        .unwrap_or_default()
}
