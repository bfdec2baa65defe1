use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use pem::Pem;
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

use crate::domain::DomainSet;

/// Facts read back from a PEM leaf certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject common name followed by the DNS alternative names, first
    /// occurrence order kept.
    pub domains: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
    pub serial: String,
    pub fingerprint: String,
}

impl CertificateInfo {
    pub fn domain_set(&self) -> DomainSet {
        DomainSet::new(&self.domains)
    }
}

pub fn parse_certificate_pem(pem_bytes: &[u8]) -> Result<CertificateInfo> {
    let (_, pem_block) = parse_x509_pem(pem_bytes)
        .map_err(|e| anyhow!("failed to parse certificate PEM: {e}"))?;
    let cert = pem_block
        .parse_x509()
        .map_err(|e| anyhow!("failed to parse certificate: {e}"))?;

    let mut domains: Vec<String> = Vec::new();
    for cn in cert.subject().iter_common_name() {
        if let Ok(name) = cn.as_str() {
            if !name.is_empty() && !domains.iter().any(|d| d == name) {
                domains.push(name.to_string());
            }
        }
    }
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                if !domains.iter().any(|d| d == dns) {
                    domains.push(dns.to_string());
                }
            }
        }
    }

    let not_before = timestamp_to_utc(cert.validity().not_before.timestamp())?;
    let not_after = timestamp_to_utc(cert.validity().not_after.timestamp())?;

    let fingerprint = {
        let mut hasher = Sha256::new();
        hasher.update(cert.as_raw());
        hex::encode(hasher.finalize())
    };

    Ok(CertificateInfo {
        domains,
        not_before,
        not_after,
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        fingerprint,
    })
}

pub fn parse_certificate_file(path: &Path) -> Result<CertificateInfo> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read certificate {}", path.display()))?;
    parse_certificate_pem(&data)
}

fn timestamp_to_utc(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| anyhow!("certificate validity timestamp out of range: {secs}"))
}

/// Splits a downloaded PEM bundle into the leaf and the remaining issuer chain.
/// The issuer part is empty when the bundle holds only the leaf.
pub fn split_certificate_chain(bundle_pem: &str) -> Result<(String, String)> {
    let blocks = pem::parse_many(bundle_pem)
        .map_err(|err| anyhow!("failed to parse certificate chain PEM: {err}"))?;
    let cert_blocks: Vec<Pem> = blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .collect();

    if cert_blocks.is_empty() {
        return Err(anyhow!("no certificate PEM blocks found"));
    }

    let encoded: Vec<String> = cert_blocks.iter().map(pem::encode).collect();
    let leaf = encoded[0].clone();
    let issuer = encoded[1..].join("");
    Ok((leaf, issuer))
}
