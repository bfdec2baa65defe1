use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::Config;
use crate::core::types::{IssueOutcome, IssueReport};
use crate::distribution::kubernetes::write_tls_secret;
use crate::domain::DomainSet;
use crate::issuance::certificate::parse_certificate_pem;
use crate::issuance::dns_providers::{ChallengeProvider, CloudflareClient, DnsApi, ZoneResolver};
use crate::issuance::issuer::{CertificateIssuer, Dns01Solver};
use crate::issuance::renewal::{Decision, RenewalDecisionEngine};
use crate::prompt::Prompt;
use crate::storage::{
    CertificateMetadata, CertificatePaths, archive_current, cleanup_archive, ensure_layout,
    load_metadata, save, save_metadata,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct IssueOptions {
    /// Also write a Kubernetes TLS Secret manifest into `current/`.
    pub kubernetes_secret: bool,
}

/// DNS-01 solver backed by Cloudflare, after checking the API token.
pub fn cloudflare_solver(
    config: &Config,
    prompt: Arc<dyn Prompt>,
) -> Result<ChallengeProvider<CloudflareClient>> {
    let client = CloudflareClient::new(config.api_token()?);
    client
        .verify_token()
        .context("API token verification failed")?;
    Ok(ChallengeProvider::new(
        ZoneResolver::new(client, prompt),
        config.propagation_delay,
        config.dns_timeout,
    ))
}

/// Issues (or re-issues) the certificate for `domains` in its slot under
/// the configured storage root.
pub fn issue_certificate(
    config: &Config,
    domains: &DomainSet,
    engine: &RenewalDecisionEngine,
    issuer: &dyn CertificateIssuer,
    solver: &mut dyn Dns01Solver,
    options: IssueOptions,
    now: DateTime<Utc>,
) -> Result<IssueOutcome> {
    let paths = CertificatePaths::for_domains(&config.cert_dir, domains)?;
    issue_into_slot(config, &paths, domains, engine, issuer, solver, options, now)
}

/// Runs the decision, issuance and persistence steps for one slot.
///
/// `current/` is only touched once the issuer has returned a certificate.
#[allow(clippy::too_many_arguments)]
pub(crate) fn issue_into_slot(
    config: &Config,
    paths: &CertificatePaths,
    domains: &DomainSet,
    engine: &RenewalDecisionEngine,
    issuer: &dyn CertificateIssuer,
    solver: &mut dyn Dns01Solver,
    options: IssueOptions,
    now: DateTime<Utc>,
) -> Result<IssueOutcome> {
    ensure_layout(paths).context("failed to create certificate structure")?;

    let decision = engine.decide(domains, paths, now);
    if !decision.proceeds() {
        info!("[issue] {domains}: skipped by operator");
        return Ok(IssueOutcome::Skipped);
    }

    let prior_count = read_prior_renewal_count(paths);

    let issued = issuer
        .obtain_certificate(domains, solver)
        .context("failed to obtain certificate")?;

    let archived_files = match archive_current(paths) {
        Ok(files) => files.len(),
        Err(err) => {
            warn!("[issue] failed to archive old certificate: {err:#}");
            0
        }
    };

    save(
        paths,
        issued.certificate.as_bytes(),
        issued.private_key.as_bytes(),
        issued.issuer_certificate.as_bytes(),
    )
    .context("failed to save certificate files")?;
    debug!("[issue] saved certificate files in {}", paths.current_dir.display());

    let renewal_count = next_renewal_count(decision, prior_count);
    if let Err(err) = write_metadata(config, paths, domains, &issued.certificate, renewal_count, now)
    {
        warn!("[issue] failed to save metadata: {err:#}");
    }

    let cleaned_files = match cleanup_archive(
        &paths.archive_dir,
        config.archive_retention_days,
        SystemTime::from(now),
    ) {
        Ok(removed) => removed,
        Err(err) => {
            warn!("[issue] failed to clean up old archives: {err:#}");
            0
        }
    };

    let kubernetes_secret = if options.kubernetes_secret {
        match write_tls_secret(paths, domains, &paths.current_dir, now) {
            Ok(file) => Some(file),
            Err(err) => {
                warn!("[issue] failed to create Kubernetes secret: {err:#}");
                None
            }
        }
    } else {
        None
    };

    Ok(IssueOutcome::Issued(IssueReport {
        decision,
        paths: paths.clone(),
        not_after: issued.not_after,
        renewal_count,
        archived_files,
        cleaned_files,
        kubernetes_secret,
    }))
}

/// Prior counter from `current/cert.json`; `None` when absent or unreadable.
fn read_prior_renewal_count(paths: &CertificatePaths) -> Option<u32> {
    if !paths.metadata_file.exists() {
        return None;
    }
    match load_metadata(&paths.metadata_file) {
        Ok(metadata) => Some(metadata.renewal_count),
        Err(err) => {
            warn!("[issue] ignoring unreadable metadata, renewal count resets: {err:#}");
            None
        }
    }
}

fn next_renewal_count(decision: Decision, prior: Option<u32>) -> u32 {
    match (decision, prior) {
        (Decision::Renew, Some(count)) => count.saturating_add(1),
        _ => 0,
    }
}

fn write_metadata(
    config: &Config,
    paths: &CertificatePaths,
    domains: &DomainSet,
    certificate_pem: &str,
    renewal_count: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let info = parse_certificate_pem(certificate_pem.as_bytes())?;
    let metadata =
        CertificateMetadata::for_certificate(domains, &info, config.key_type, &config.acme_server, now)
            .with_renewal_count(renewal_count);
    save_metadata(&paths.metadata_file, &metadata)
}
