use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    domain::DomainSet, issuance::certificate::parse_certificate_file, prompt::Prompt,
    storage::CertificatePaths,
};

/// Certificates expiring within this many days are offered for renewal.
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Renew,
    Replace,
}

impl Decision {
    pub fn proceeds(self) -> bool {
        !matches!(self, Decision::Skip)
    }
}

/// Whole days left until `expires_at`, truncated toward zero.
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_hours() / 24
}

/// Decides whether a slot's certificate should be issued again.
pub struct RenewalDecisionEngine {
    force: bool,
    prompt: Arc<dyn Prompt>,
}

impl RenewalDecisionEngine {
    pub fn new(force: bool, prompt: Arc<dyn Prompt>) -> Self {
        Self { force, prompt }
    }

    pub fn decide(
        &self,
        requested: &DomainSet,
        paths: &CertificatePaths,
        now: DateTime<Utc>,
    ) -> Decision {
        if self.force {
            debug!("[renewal] force flag set, renewing {requested}");
            return Decision::Renew;
        }
        if !paths.has_certificate() {
            debug!(
                "[renewal] no certificate at {}, issuing",
                paths.cert_file.display()
            );
            return Decision::Renew;
        }

        let existing = match parse_certificate_file(&paths.cert_file) {
            Ok(info) => info,
            Err(err) => {
                warn!("[renewal] failed to parse existing certificate: {err:#}");
                return Decision::Renew;
            }
        };

        let existing_domains = existing.domain_set();
        if existing_domains != *requested {
            let message = format!(
                "Found existing certificate with different domains.\n   Existing: {existing_domains}\n   Requested: {requested}\nDo you want to replace it with the new certificate?"
            );
            return if self.prompt.confirm(&message) {
                info!("[renewal] replacing certificate for {existing_domains} with {requested}");
                Decision::Replace
            } else {
                Decision::Skip
            };
        }

        let days = days_remaining(existing.not_after, now);
        let expiry = existing.not_after.format("%Y-%m-%d %H:%M");
        if existing.not_after < now {
            warn!(
                "[renewal] certificate for {requested} expired {} day(s) ago, renewing",
                -days
            );
            return Decision::Renew;
        }

        let message = if days <= RENEWAL_WINDOW_DAYS {
            format!(
                "Certificate for {requested} expires in {days} days ({expiry}). Do you want to renew it now?"
            )
        } else {
            format!(
                "Certificate for {requested} is valid and expires in {days} days ({expiry}). Do you want to renew it anyway?"
            )
        };
        if self.prompt.confirm(&message) {
            Decision::Renew
        } else {
            Decision::Skip
        }
    }
}
