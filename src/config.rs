use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

pub const DEFAULT_CERT_DIR: &str = "./certs";
pub const DEFAULT_DNS_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_ARCHIVE_RETENTION_DAYS: i64 = 30;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Private key algorithm for issued certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Rsa2048,
    Rsa4096,
    Ec256,
    Ec384,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa2048 => "rsa2048",
            KeyType::Rsa4096 => "rsa4096",
            KeyType::Ec256 => "ec256",
            KeyType::Ec384 => "ec384",
        }
    }
}

impl std::str::FromStr for KeyType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rsa2048" => Ok(KeyType::Rsa2048),
            "rsa4096" => Ok(KeyType::Rsa4096),
            "ec256" => Ok(KeyType::Ec256),
            "ec384" => Ok(KeyType::Ec384),
            other => Err(ConfigError::Invalid {
                name: "key type",
                reason: format!("{other} (expected rsa2048, rsa4096, ec256 or ec384)"),
            }),
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime configuration, built once by the binary and handed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    pub cloudflare_api_token: Option<String>,
    pub cloudflare_email: Option<String>,
    pub acme_email: Option<String>,
    pub acme_server: String,
    pub cert_dir: PathBuf,
    pub dns_timeout: Duration,
    pub propagation_delay: Duration,
    pub archive_retention_days: i64,
    pub key_type: KeyType,
    pub force_renew: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cloudflare_api_token: None,
            cloudflare_email: None,
            acme_email: None,
            acme_server: LETS_ENCRYPT_PRODUCTION.to_string(),
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            dns_timeout: Duration::from_secs(DEFAULT_DNS_TIMEOUT_SECS),
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
            archive_retention_days: DEFAULT_ARCHIVE_RETENTION_DAYS,
            key_type: KeyType::default(),
            force_renew: false,
        }
    }
}

impl Config {
    pub fn with_staging(mut self, staging: bool) -> Self {
        if staging {
            self.acme_server = LETS_ENCRYPT_STAGING.to_string();
        }
        self
    }

    pub fn api_token(&self) -> Result<&str, ConfigError> {
        self.cloudflare_api_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("CLOUDFLARE_API_TOKEN"))
    }

    /// Checks everything issuance needs before any network call is made.
    pub fn validate_for_issuance(&self) -> Result<(), ConfigError> {
        self.api_token()?;
        if self
            .acme_email
            .as_deref()
            .map(|e| e.trim().is_empty())
            .unwrap_or(true)
        {
            return Err(ConfigError::Missing("ACME_EMAIL"));
        }
        if self.acme_server.trim().is_empty() {
            return Err(ConfigError::Missing("ACME_SERVER"));
        }
        Ok(())
    }
}

/// Parses a propagation timeout in seconds; invalid or non-positive input
/// falls back to the default.
pub fn parse_dns_timeout(raw: Option<&str>) -> Duration {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs as u64))
        .unwrap_or(Duration::from_secs(DEFAULT_DNS_TIMEOUT_SECS))
}

/// Expands a leading `~/` against the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    match (raw.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
