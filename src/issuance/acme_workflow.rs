use std::time::Instant;

use acme_lib::{
    Certificate, Directory, DirectoryUrl, create_p256_key, create_p384_key, create_rsa_key,
    order::NewOrder,
};
use log::{debug, info, warn};

use super::{
    certificate::{parse_certificate_pem, split_certificate_chain},
    flow::EphemeralPersist,
    issuer::{CertificateIssuer, Dns01Solver, IssuanceChallenge, IssuedCertificate, IssuerError},
};
use crate::{config::KeyType, domain::DomainSet};

const FINALIZE_POLL_MS: u64 = 5000;

/// Generates the certificate private key as PKCS#8 PEM.
pub fn generate_private_key(key_type: KeyType) -> Result<String, IssuerError> {
    let key = match key_type {
        KeyType::Rsa2048 => create_rsa_key(2048),
        KeyType::Rsa4096 => create_rsa_key(4096),
        KeyType::Ec256 => create_p256_key(),
        KeyType::Ec384 => create_p384_key(),
    };
    let key_pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| IssuerError::Operation(format!("failed to serialize private key: {e}")))?;
    String::from_utf8(key_pem)
        .map_err(|_| IssuerError::Operation("private key PEM contained invalid UTF-8".into()))
}

/// [`CertificateIssuer`] backed by an ACME directory through acme-lib.
///
/// A fresh account is registered in memory for every issuance.
pub struct AcmeIssuer {
    directory_url: String,
    contact_email: String,
    key_type: KeyType,
}

impl AcmeIssuer {
    pub fn new(directory_url: &str, contact_email: &str, key_type: KeyType) -> Self {
        Self {
            directory_url: directory_url.to_string(),
            contact_email: contact_email.to_string(),
            key_type,
        }
    }

    fn setup_acme_account(&self) -> Result<acme_lib::Account<EphemeralPersist>, IssuerError> {
        let directory = Directory::from_url(
            EphemeralPersist::new(),
            DirectoryUrl::Other(&self.directory_url),
        )
        .map_err(|e| IssuerError::Unavailable(e.to_string()))?;

        let account = directory
            .account_with_realm(
                &self.contact_email,
                Some(vec![format!("mailto:{}", self.contact_email)]),
            )
            .map_err(|e| IssuerError::Operation(format!("failed to register account: {e}")))?;
        info!("[acme] account registered with {}", self.directory_url);
        Ok(account)
    }

    fn create_acme_order(
        account: &acme_lib::Account<EphemeralPersist>,
        domains: &DomainSet,
    ) -> Result<NewOrder<EphemeralPersist>, IssuerError> {
        let primary = domains
            .primary()
            .ok_or_else(|| IssuerError::InvalidConfig("at least one domain is required".into()))?;
        let alt_names: Vec<&str> = domains
            .iter()
            .map(String::as_str)
            .filter(|domain| *domain != primary)
            .collect();
        account
            .new_order(primary, &alt_names)
            .map_err(|e| IssuerError::Operation(format!("failed to create order: {e}")))
    }

    /// Runs every pending DNS-01 authorization through `solver` until the
    /// order is ready for finalization or `timeout` elapses.
    fn complete_authorizations(
        mut order: NewOrder<EphemeralPersist>,
        solver: &mut dyn Dns01Solver,
    ) -> Result<acme_lib::order::CsrOrder<EphemeralPersist>, IssuerError> {
        let (timeout, interval) = solver.timeout();
        let started = Instant::now();
        loop {
            if let Some(csr) = order.confirm_validations() {
                return Ok(csr);
            }
            if started.elapsed() > timeout {
                return Err(IssuerError::Operation(format!(
                    "authorizations still pending after {}s",
                    timeout.as_secs()
                )));
            }

            let auths = order
                .authorizations()
                .map_err(|e| IssuerError::Operation(format!("failed to fetch authorizations: {e}")))?;
            for auth in &auths {
                if !auth.need_challenge() {
                    continue;
                }
                let dns = auth.dns_challenge();
                let challenge = IssuanceChallenge::from_proof(auth.domain_name(), &dns.dns_proof());
                solve_one(solver, &challenge, || {
                    dns.validate(interval.as_millis() as u64)
                        .map_err(|e| e.to_string())
                })?;
            }

            order
                .refresh()
                .map_err(|e| IssuerError::Operation(format!("failed to refresh order: {e}")))?;
        }
    }

    fn finalize_acme_certificate(
        csr: acme_lib::order::CsrOrder<EphemeralPersist>,
        private_key_pem: &str,
    ) -> Result<Certificate, IssuerError> {
        let cert_order = csr
            .finalize(private_key_pem, FINALIZE_POLL_MS)
            .map_err(|e| IssuerError::Operation(format!("failed to finalize order: {e}")))?;
        cert_order
            .download_and_save_cert()
            .map_err(|e| IssuerError::Operation(format!("failed to download certificate: {e}")))
    }
}

/// Presents one proof, validates it, then always cleans up. A cleanup
/// failure after a successful validation is only logged.
fn solve_one(
    solver: &mut dyn Dns01Solver,
    challenge: &IssuanceChallenge,
    validate: impl FnOnce() -> Result<(), String>,
) -> Result<(), IssuerError> {
    if let Err(err) = solver.present(challenge) {
        if let Err(cleanup_err) = solver.clean_up(challenge) {
            warn!("[acme] cleanup after failed present for {}: {cleanup_err:#}", challenge.domain);
        }
        return Err(IssuerError::Challenge {
            domain: challenge.domain.clone(),
            reason: format!("{err:#}"),
        });
    }

    debug!("[acme] validating DNS-01 challenge for {}", challenge.domain);
    let validated = validate();

    if let Err(cleanup_err) = solver.clean_up(challenge) {
        warn!("[acme] failed to clean up challenge record for {}: {cleanup_err:#}", challenge.domain);
    }

    validated.map_err(|reason| IssuerError::Challenge {
        domain: challenge.domain.clone(),
        reason,
    })
}

impl CertificateIssuer for AcmeIssuer {
    fn obtain_certificate(
        &self,
        domains: &DomainSet,
        solver: &mut dyn Dns01Solver,
    ) -> Result<IssuedCertificate, IssuerError> {
        if self.contact_email.trim().is_empty() {
            return Err(IssuerError::InvalidConfig("ACME contact email is required".into()));
        }
        info!("[acme] requesting certificate for {domains}");

        let account = self.setup_acme_account()?;
        let order = Self::create_acme_order(&account, domains)?;
        let csr = Self::complete_authorizations(order, solver)?;

        let private_key = generate_private_key(self.key_type)?;
        let cert = Self::finalize_acme_certificate(csr, &private_key)?;

        let (leaf, issuer) = split_certificate_chain(cert.certificate())
            .map_err(|e| IssuerError::Operation(format!("{e:#}")))?;
        let info = parse_certificate_pem(leaf.as_bytes())
            .map_err(|e| IssuerError::Operation(format!("{e:#}")))?;
        info!("[acme] certificate issued, valid until {}", info.not_after);

        Ok(IssuedCertificate {
            certificate: leaf,
            private_key,
            issuer_certificate: issuer,
            not_after: info.not_after,
        })
    }
}
