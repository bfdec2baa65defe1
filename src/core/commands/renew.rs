use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use log::{info, warn};

use super::issue::{IssueOptions, issue_into_slot};
use super::list::list_certificates;
use crate::config::Config;
use crate::core::types::{BatchReport, CertificateSummary, IssueOutcome};
use crate::domain::DomainSet;
use crate::issuance::issuer::{CertificateIssuer, Dns01Solver};
use crate::issuance::renewal::{RENEWAL_WINDOW_DAYS, RenewalDecisionEngine};
use crate::prompt::FixedAnswer;

#[derive(Debug, Clone, Copy)]
pub struct RenewOptions {
    /// Renew certificates expiring within this many days.
    pub days: i64,
    /// Renew every stored certificate regardless of expiry.
    pub all: bool,
}

impl Default for RenewOptions {
    fn default() -> Self {
        Self {
            days: RENEWAL_WINDOW_DAYS,
            all: false,
        }
    }
}

/// Stored certificates due for renewal under `options`.
pub fn find_renewal_candidates(
    root: &Path,
    options: RenewOptions,
    now: DateTime<Utc>,
) -> Result<Vec<CertificateSummary>> {
    let threshold = TimeDelta::try_days(options.days)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| anyhow!("renewal window of {} days is out of range", options.days))?;
    Ok(list_certificates(root, now)?
        .into_iter()
        .filter(|cert| options.all || cert.not_after < threshold)
        .collect())
}

/// Re-issues every candidate in turn without prompting. A failing slot is
/// recorded in the report and the batch moves on.
pub fn renew_certificates(
    config: &Config,
    options: RenewOptions,
    issuer: &dyn CertificateIssuer,
    solver: &mut dyn Dns01Solver,
    now: DateTime<Utc>,
) -> Result<BatchReport> {
    let candidates = find_renewal_candidates(&config.cert_dir, options, now)?;
    let engine = RenewalDecisionEngine::new(true, Arc::new(FixedAnswer(true)));
    let mut report = BatchReport::default();

    for cert in candidates {
        info!("[renewal] renewing {} ({})", cert.slot, cert.domains.join(", "));
        let result = match DomainSet::parse(&cert.domains) {
            Ok(domains) => issue_into_slot(
                config,
                &cert.paths,
                &domains,
                &engine,
                issuer,
                &mut *solver,
                IssueOptions::default(),
                now,
            ),
            Err(err) => Err(err),
        };
        match result {
            Ok(IssueOutcome::Issued(_)) => report.record_success(&cert.slot),
            Ok(IssueOutcome::Skipped) => {
                report.record_failure(&cert.slot, &anyhow!("renewal was skipped"))
            }
            Err(err) => {
                warn!("[renewal] failed to renew {}: {err:#}", cert.slot);
                report.record_failure(&cert.slot, &err);
            }
        }
    }
    Ok(report)
}
