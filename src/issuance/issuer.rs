use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{DomainSet, base_domain};

const DNS01_LABEL: &str = "_acme-challenge";

/// Issuance service boundary: obtain a signed certificate for a domain set,
/// proving control of each name through the supplied solver.
pub trait CertificateIssuer {
    fn obtain_certificate(
        &self,
        domains: &DomainSet,
        solver: &mut dyn Dns01Solver,
    ) -> Result<IssuedCertificate, IssuerError>;
}

/// The create/remove contract for DNS-01 proof records.
pub trait Dns01Solver {
    fn present(&mut self, challenge: &IssuanceChallenge) -> anyhow::Result<()>;
    fn clean_up(&mut self, challenge: &IssuanceChallenge) -> anyhow::Result<()>;
    /// Maximum time to wait for validation and the poll interval.
    fn timeout(&self) -> (Duration, Duration);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub certificate: String,
    pub private_key: String,
    /// Issuer chain without the leaf; may be empty.
    pub issuer_certificate: String,
    pub not_after: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceChallenge {
    pub domain: String,
    pub token: String,
    pub key_auth: String,
    record_value: String,
}

impl IssuanceChallenge {
    pub fn dns01(domain: &str, token: &str, key_auth: &str) -> Self {
        let (_, value) = dns01_record(domain, key_auth);
        Self {
            domain: domain.to_string(),
            token: token.to_string(),
            key_auth: key_auth.to_string(),
            record_value: value,
        }
    }

    /// Builds a challenge from an already digested TXT value, for clients
    /// that only expose the proof. A fresh token identifies the attempt.
    pub fn from_proof(domain: &str, proof: &str) -> Self {
        Self {
            domain: domain.to_string(),
            token: Uuid::new_v4().to_string(),
            key_auth: String::new(),
            record_value: proof.to_string(),
        }
    }

    pub fn record_name(&self) -> String {
        dns01_record_name(&self.domain)
    }

    pub fn record_value(&self) -> &str {
        &self.record_value
    }
}

/// TXT record name and value proving `key_auth` for `domain`.
pub fn dns01_record(domain: &str, key_auth: &str) -> (String, String) {
    let digest = Sha256::digest(key_auth.as_bytes());
    (dns01_record_name(domain), URL_SAFE_NO_PAD.encode(digest))
}

fn dns01_record_name(domain: &str) -> String {
    let bare = base_domain(domain.trim().trim_end_matches('.'));
    format!("{DNS01_LABEL}.{bare}")
}

#[derive(Error, Debug)]
pub enum IssuerError {
    #[error("issuer unavailable: {0}")]
    Unavailable(String),
    #[error("issuer configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("issuer operation failed: {0}")]
    Operation(String),
    #[error("challenge for {domain} failed: {reason}")]
    Challenge { domain: String, reason: String },
}
