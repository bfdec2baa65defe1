use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;

use crate::core::types::{CertificateStatus, CertificateSummary};
use crate::issuance::certificate::parse_certificate_file;
use crate::storage::list_slots;

const DOMAINS_COLUMN_WIDTH: usize = 40;

/// Every parseable certificate under `root`, sorted by slot name.
pub fn list_certificates(root: &Path, now: DateTime<Utc>) -> Result<Vec<CertificateSummary>> {
    let mut summaries = Vec::new();
    for slot in list_slots(root)? {
        let info = match parse_certificate_file(&slot.paths.cert_file) {
            Ok(info) => info,
            Err(err) => {
                debug!("[list] skipping {}: {err:#}", slot.name);
                continue;
            }
        };
        summaries.push(CertificateSummary {
            status: CertificateStatus::classify(info.not_after, now),
            domains: info.domains,
            not_after: info.not_after,
            directory: slot.paths.slot_dir.clone(),
            slot: slot.name,
            paths: slot.paths,
        });
    }
    Ok(summaries)
}

/// Shortens `text` to `width` characters, ending in `...` when cut.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Fixed-width table of certificates for the terminal.
pub fn format_certificate_table(certificates: &[CertificateSummary]) -> String {
    let mut out = format!(
        "{:<30} {:<40} {:<17} {}\n",
        "SLOT", "DOMAINS", "EXPIRES", "STATUS"
    );
    out.push_str(&format!("{}\n", "-".repeat(100)));
    for cert in certificates {
        out.push_str(&format!(
            "{:<30} {:<40} {:<17} {}\n",
            cert.slot,
            truncate(&cert.domains.join(", "), DOMAINS_COLUMN_WIDTH),
            cert.not_after.format("%Y-%m-%d %H:%M"),
            cert.status.label()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainSet;
    use crate::issuance::certificate::test_support::self_signed_pem;
    use crate::storage::{CertificatePaths, ensure_layout};
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn store(root: &Path, domains: &[&str], pem: &str) {
        let paths = CertificatePaths::for_domains(root, &DomainSet::new(domains)).unwrap();
        ensure_layout(&paths).unwrap();
        fs::write(&paths.cert_file, pem).unwrap();
    }

    #[test]
    fn lists_parseable_certificates_with_status() {
        let root = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        store(
            root.path(),
            &["*.example.com"],
            &self_signed_pem(&["*.example.com", "example.com"], (2030, 1, 10)),
        );
        store(
            root.path(),
            &["api.example.org"],
            &self_signed_pem(&["api.example.org"], (2029, 6, 1)),
        );
        store(root.path(), &["broken.example.net"], "garbage");

        let certs = list_certificates(root.path(), now).expect("list");
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].slot, "api.example.org");
        assert_eq!(certs[0].status, CertificateStatus::Expired);
        assert_eq!(certs[1].slot, "wildcard.example.com");
        assert_eq!(certs[1].domains, vec!["*.example.com", "example.com"]);
        assert_eq!(certs[1].status, CertificateStatus::ExpiresSoon);

        let table = format_certificate_table(&certs);
        assert!(table.contains("2030-01-10 00:00"));
        assert!(table.contains("Expires Soon"));
    }

    #[test]
    fn truncates_long_domain_lists() {
        assert_eq!(truncate("short", 40), "short");
        let long = "a".repeat(50);
        let cut = truncate(&long, 40);
        assert_eq!(cut.chars().count(), 40);
        assert!(cut.ends_with("..."));
    }
}
