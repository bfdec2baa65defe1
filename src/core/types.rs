use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::issuance::renewal::{Decision, RENEWAL_WINDOW_DAYS, days_remaining};
use crate::storage::CertificatePaths;

/// Health of a stored certificate relative to the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Valid,
    ExpiresSoon,
    Expired,
}

impl CertificateStatus {
    pub fn classify(not_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if not_after < now {
            CertificateStatus::Expired
        } else if days_remaining(not_after, now) <= RENEWAL_WINDOW_DAYS {
            CertificateStatus::ExpiresSoon
        } else {
            CertificateStatus::Valid
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CertificateStatus::Valid => "Valid",
            CertificateStatus::ExpiresSoon => "Expires Soon",
            CertificateStatus::Expired => "Expired",
        }
    }
}

/// A certificate found in the storage root, as shown by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    /// Slot directory name, e.g. `wildcard.example.com`.
    pub slot: String,
    /// Names embedded in the certificate, common name first.
    pub domains: Vec<String>,
    pub not_after: DateTime<Utc>,
    pub status: CertificateStatus,
    /// Path of the slot directory.
    pub directory: PathBuf,
    #[serde(skip)]
    pub paths: CertificatePaths,
}

/// What the issue command did for one slot.
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// The operator declined; nothing was written.
    Skipped,
    Issued(IssueReport),
}

#[derive(Debug, Clone)]
pub struct IssueReport {
    pub decision: Decision,
    pub paths: CertificatePaths,
    pub not_after: DateTime<Utc>,
    pub renewal_count: u32,
    /// Number of files moved from `current/` into `archive/`.
    pub archived_files: usize,
    /// Number of expired archive files removed.
    pub cleaned_files: usize,
    pub kubernetes_secret: Option<PathBuf>,
}

/// A failed entry in a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub name: String,
    pub error: String,
}

/// Per-item results of a best-effort batch (renew, export).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn record_success(&mut self, name: impl Into<String>) {
        self.succeeded.push(name.into());
    }

    pub fn record_failure(&mut self, name: impl Into<String>, error: &anyhow::Error) {
        self.failed.push(BatchFailure {
            name: name.into(),
            error: format!("{error:#}"),
        });
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
