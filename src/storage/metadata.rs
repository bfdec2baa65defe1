use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{config::KeyType, domain::DomainSet, issuance::certificate::CertificateInfo};

pub const METADATA_VERSION: &str = "1.0";

/// Contents of `cert.json`, stored next to each certificate generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub domain: String,
    pub domains: Vec<String>,
    pub is_wildcard: bool,
    pub key_type: KeyType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub fingerprint: String,
    pub acme_server: String,
    pub version: String,
    #[serde(default)]
    pub renewal_count: u32,
}

impl CertificateMetadata {
    /// Metadata for a freshly saved certificate. The renewal counter starts
    /// at zero; use [`CertificateMetadata::with_renewal_count`] on renewals.
    pub fn for_certificate(
        domains: &DomainSet,
        info: &CertificateInfo,
        key_type: KeyType,
        acme_server: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            domain: domains.primary().unwrap_or_default().to_string(),
            domains: domains.as_slice().to_vec(),
            is_wildcard: domains.is_wildcard(),
            key_type,
            created_at,
            expires_at: info.not_after,
            issuer: info.issuer.clone(),
            serial_number: info.serial.clone(),
            fingerprint: info.fingerprint.clone(),
            acme_server: acme_server.to_string(),
            version: METADATA_VERSION.to_string(),
            renewal_count: 0,
        }
    }

    pub fn with_renewal_count(mut self, renewal_count: u32) -> Self {
        self.renewal_count = renewal_count;
        self
    }
}

pub fn save_metadata(path: &Path, metadata: &CertificateMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)
        .context("failed to serialize certificate metadata")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write metadata {}", path.display()))
}

pub fn load_metadata(path: &Path) -> Result<CertificateMetadata> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read metadata {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse metadata {}", path.display()))
}
