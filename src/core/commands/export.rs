use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use log::warn;

use super::list::list_certificates;
use crate::core::types::{BatchReport, CertificateSummary};
use crate::distribution::kubernetes::write_tls_secret;
use crate::domain::DomainSet;

/// Which stored certificates to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// Matched against the slot name and every name in the certificate.
    Domain(String),
    All,
}

impl ExportTarget {
    /// Maps the `--domain`/`--all` flags; `None` when neither was given.
    pub fn from_flags(domain: Option<String>, all: bool) -> Result<Option<Self>> {
        match (domain, all) {
            (Some(_), true) => bail!("cannot specify both --domain and --all"),
            (Some(domain), false) => Ok(Some(ExportTarget::Domain(domain))),
            (None, true) => Ok(Some(ExportTarget::All)),
            (None, false) => Ok(None),
        }
    }

    fn matches(&self, cert: &CertificateSummary) -> bool {
        match self {
            ExportTarget::All => true,
            ExportTarget::Domain(domain) => {
                let wanted = domain.trim();
                cert.slot.eq_ignore_ascii_case(wanted)
                    || cert.domains.iter().any(|name| name.eq_ignore_ascii_case(wanted))
            }
        }
    }
}

/// Writes a Kubernetes TLS Secret for every matching slot, into
/// `output_dir` or each slot's `current/` directory.
pub fn export_certificates(
    root: &Path,
    target: &ExportTarget,
    output_dir: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<BatchReport> {
    let selected: Vec<CertificateSummary> = list_certificates(root, now)?
        .into_iter()
        .filter(|cert| target.matches(cert))
        .collect();
    if selected.is_empty() {
        match target {
            ExportTarget::Domain(domain) => bail!("no certificate found for {domain}"),
            ExportTarget::All => bail!("no certificates found in {}", root.display()),
        }
    }

    let mut report = BatchReport::default();
    for cert in selected {
        let dir: PathBuf = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cert.paths.current_dir.clone());
        let domains = DomainSet::new(&cert.domains);
        match write_tls_secret(&cert.paths, &domains, &dir, now) {
            Ok(file) => report.record_success(file.display().to_string()),
            Err(err) => {
                warn!("[export] failed to export {}: {err:#}", cert.slot);
                report.record_failure(&cert.slot, &err);
            }
        }
    }
    Ok(report)
}
