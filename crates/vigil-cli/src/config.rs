//! Configuration file handling.
//!
//! Reads from `~/.config/vigil/vigil.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vigil_core::breach::{hibp, OrchestratorSettings};

/// Smallest spacing allowed between password range queries.
const MIN_PASSWORD_INTERVAL_MS: u64 = 1500;
/// Smallest spacing allowed between breached-account queries.
const MIN_EMAIL_INTERVAL_MS: u64 = 6000;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the KeePass database file.
    pub database_path: PathBuf,
    /// HIBP API key. Email checks are skipped without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hibp_api_key: Option<String>,
    /// Where breach caches are stored (defaults to the user cache directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Where the database is written when saving to its own path fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_save_dir: Option<PathBuf>,
    /// Spacing between password lookups, never below 1500ms.
    #[serde(default = "default_password_request_interval_ms")]
    pub password_request_interval_ms: u64,
    /// Spacing between email lookups, never below 6000ms.
    #[serde(default = "default_email_request_interval_ms")]
    pub email_request_interval_ms: u64,
    #[serde(default = "default_range_api_url")]
    pub range_api_url: String,
    #[serde(default = "default_breach_api_url")]
    pub breach_api_url: String,
}

fn default_password_request_interval_ms() -> u64 {
    MIN_PASSWORD_INTERVAL_MS
}

fn default_email_request_interval_ms() -> u64 {
    MIN_EMAIL_INTERVAL_MS
}

fn default_range_api_url() -> String {
    hibp::DEFAULT_RANGE_API_URL.to_string()
}

fn default_breach_api_url() -> String {
    hibp::DEFAULT_BREACH_API_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database.kdbx"),
            hibp_api_key: None,
            cache_dir: None,
            fallback_save_dir: None,
            password_request_interval_ms: default_password_request_interval_ms(),
            email_request_interval_ms: default_email_request_interval_ms(),
            range_api_url: default_range_api_url(),
            breach_api_url: default_breach_api_url(),
        }
    }
}

impl Config {
    /// Load configuration from the config file.
    ///
    /// If `custom_path` is provided, load from that path.
    /// Otherwise, load from the default XDG config location.
    /// Creates a default config file if it doesn't exist (only for default path).
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self> {
        let is_custom = custom_path.is_some();
        let config_path = match custom_path {
            Some(path) => path,
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            // Only create default config for the default path
            if !is_custom {
                let config = Config::default();
                config.save()?;
                tracing::info!("Created default config at {}", config_path.display());
                return Ok(config);
            } else {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to the config file.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }

    /// Rate limits for the breach scanner, clamped to the service minimums.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            password_interval: Duration::from_millis(
                self.password_request_interval_ms.max(MIN_PASSWORD_INTERVAL_MS),
            ),
            email_interval: Duration::from_millis(
                self.email_request_interval_ms.max(MIN_EMAIL_INTERVAL_MS),
            ),
        }
    }

    /// Directory holding the breach caches.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::cache_dir()
                .context("Could not determine cache directory")?
                .join("vigil")),
        }
    }

    /// Get the path to the config file.
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("vigil").join("vigil.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_gets_defaults() {
        let config = Config::parse(r#"database_path = "/home/me/vault.kdbx""#).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/home/me/vault.kdbx"));
        assert_eq!(config.hibp_api_key, None);
        assert_eq!(config.password_request_interval_ms, 1500);
        assert_eq!(config.email_request_interval_ms, 6000);
        assert_eq!(config.range_api_url, "https://api.pwnedpasswords.com");
    }

    #[test]
    fn intervals_never_drop_below_service_minimums() {
        let config = Config::parse(
            r#"
            database_path = "vault.kdbx"
            password_request_interval_ms = 10
            email_request_interval_ms = 9000
            "#,
        )
        .unwrap();

        let settings = config.orchestrator_settings();
        assert_eq!(settings.password_interval, Duration::from_millis(1500));
        assert_eq!(settings.email_interval, Duration::from_millis(9000));
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let config = Config {
            cache_dir: Some(PathBuf::from("/tmp/vigil-cache")),
            ..Config::default()
        };
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/vigil-cache"));
    }

    #[test]
    fn missing_custom_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn serialized_config_round_trips() {
        let config = Config {
            hibp_api_key: Some("key".to_string()),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::parse(&text).unwrap();
        assert_eq!(parsed.hibp_api_key.as_deref(), Some("key"));
        assert_eq!(parsed.database_path, config.database_path);
    }
}
