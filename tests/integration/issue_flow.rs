use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use tempfile::TempDir;

use zonecert::config::Config;
use zonecert::core::commands::{
    IssueOptions, RenewOptions, issue_certificate, list_certificates, renew_certificates,
};
use zonecert::core::types::{IssueOutcome, IssueReport};
use zonecert::domain::DomainSet;
use zonecert::issuance::certificate::parse_certificate_pem;
use zonecert::issuance::dns_providers::{ChallengeProvider, DnsApi, ZoneInfo, ZoneResolver};
use zonecert::issuance::issuer::{
    CertificateIssuer, Dns01Solver, IssuanceChallenge, IssuedCertificate, IssuerError,
};
use zonecert::issuance::renewal::{Decision, RenewalDecisionEngine};
use zonecert::prompt::FixedAnswer;
use zonecert::storage::{CertificatePaths, load_metadata};

/// DNS API double keeping the set of live TXT records.
#[derive(Default)]
struct FakeDns {
    zones: Vec<ZoneInfo>,
    live: Mutex<HashSet<String>>,
    created: Mutex<u32>,
}

impl FakeDns {
    fn with_zones(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            zones: names
                .iter()
                .map(|name| ZoneInfo {
                    id: format!("zone-{name}"),
                    name: name.to_string(),
                    status: "active".to_string(),
                })
                .collect(),
            ..Self::default()
        })
    }

    fn live_records(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    fn created(&self) -> u32 {
        *self.created.lock().unwrap()
    }
}

impl DnsApi for FakeDns {
    fn verify_token(&self) -> Result<()> {
        Ok(())
    }

    fn list_zones(&self, name: Option<&str>) -> Result<Vec<ZoneInfo>> {
        Ok(self
            .zones
            .iter()
            .filter(|zone| name.is_none_or(|n| zone.name == n))
            .cloned()
            .collect())
    }

    fn create_txt_record(
        &self,
        _zone_id: &str,
        _name: &str,
        _content: &str,
        _ttl: u32,
    ) -> Result<String> {
        let mut created = self.created.lock().unwrap();
        *created += 1;
        let id = format!("rec-{created}");
        self.live.lock().unwrap().insert(id.clone());
        Ok(id)
    }

    fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<()> {
        self.live.lock().unwrap().remove(record_id);
        Ok(())
    }
}

/// Issuer double: proves each name through the solver, then signs a leaf
/// with a throwaway CA.
struct FakeIssuer {
    valid_days: i64,
    fail_for: Option<String>,
    calls: Mutex<u32>,
}

impl FakeIssuer {
    fn valid_for(valid_days: i64) -> Self {
        Self {
            valid_days,
            fail_for: None,
            calls: Mutex::new(0),
        }
    }

    fn failing_for(domain: &str, valid_days: i64) -> Self {
        Self {
            fail_for: Some(domain.to_string()),
            ..Self::valid_for(valid_days)
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn sign(&self, domains: &DomainSet) -> (String, String, String) {
        let mut ca_params =
            CertificateParams::new(vec!["ca.example.test".to_string()]).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let names: Vec<String> = domains.iter().cloned().collect();
        let mut params = CertificateParams::new(names.clone()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, names[0].as_str());
        params.distinguished_name = dn;
        let expires = Utc::now() + ChronoDuration::days(self.valid_days);
        params.not_after =
            rcgen::date_time_ymd(expires.year(), expires.month() as u8, expires.day() as u8);
        let key = KeyPair::generate().unwrap();
        let leaf = params.signed_by(&key, &ca, &ca_key).unwrap();
        (leaf.pem(), ca.pem(), key.serialize_pem())
    }
}

impl CertificateIssuer for FakeIssuer {
    fn obtain_certificate(
        &self,
        domains: &DomainSet,
        solver: &mut dyn Dns01Solver,
    ) -> Result<IssuedCertificate, IssuerError> {
        *self.calls.lock().unwrap() += 1;
        for domain in domains {
            let challenge = IssuanceChallenge::dns01(domain, "token", &format!("ka-{domain}"));
            solver
                .present(&challenge)
                .map_err(|err| IssuerError::Challenge {
                    domain: domain.clone(),
                    reason: format!("{err:#}"),
                })?;
            let rejected = self.fail_for.as_deref() == Some(domain.as_str());
            solver
                .clean_up(&challenge)
                .map_err(|err| IssuerError::Operation(format!("{err:#}")))?;
            if rejected {
                return Err(IssuerError::Challenge {
                    domain: domain.clone(),
                    reason: "incorrect TXT record".into(),
                });
            }
        }

        let (certificate, issuer_certificate, private_key) = self.sign(domains);
        let not_after = parse_certificate_pem(certificate.as_bytes())
            .map_err(|err| IssuerError::Operation(format!("{err:#}")))?
            .not_after;
        Ok(IssuedCertificate {
            certificate,
            private_key,
            issuer_certificate,
            not_after,
        })
    }
}

struct Harness {
    _root: TempDir,
    config: Config,
    dns: Arc<FakeDns>,
}

impl Harness {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let config = Config {
            cloudflare_api_token: Some("token".into()),
            acme_email: Some("ops@example.com".into()),
            cert_dir: root.path().join("certs"),
            ..Config::default()
        };
        Self {
            _root: root,
            config,
            dns: FakeDns::with_zones(&["example.com", "example.org"]),
        }
    }

    fn solver(&self) -> ChallengeProvider<Arc<FakeDns>> {
        let resolver = ZoneResolver::new(self.dns.clone(), Arc::new(FixedAnswer(false)));
        ChallengeProvider::new(resolver, Duration::ZERO, Duration::from_secs(60))
    }

    fn issue(
        &self,
        domains: &[&str],
        engine: &RenewalDecisionEngine,
        issuer: &FakeIssuer,
        options: IssueOptions,
    ) -> Result<IssueOutcome> {
        let mut solver = self.solver();
        let outcome = issue_certificate(
            &self.config,
            &DomainSet::parse(domains)?,
            engine,
            issuer,
            &mut solver,
            options,
            Utc::now(),
        )?;
        if solver.pending_records() != 0 {
            return Err(anyhow!("challenge records left behind"));
        }
        Ok(outcome)
    }
}

fn issued(outcome: IssueOutcome) -> IssueReport {
    match outcome {
        IssueOutcome::Issued(report) => report,
        IssueOutcome::Skipped => panic!("expected an issued certificate"),
    }
}

fn engine(force: bool, answer: bool) -> RenewalDecisionEngine {
    RenewalDecisionEngine::new(force, Arc::new(FixedAnswer(answer)))
}

#[test]
fn first_issuance_populates_slot() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let report = issued(
        harness
            .issue(
                &["*.example.com", "example.com"],
                &engine(false, false),
                &issuer,
                IssueOptions::default(),
            )
            .unwrap(),
    );

    assert_eq!(report.decision, Decision::Renew);
    assert_eq!(report.renewal_count, 0);
    assert_eq!(report.archived_files, 0);
    assert!(report.paths.slot_dir.ends_with("wildcard.example.com"));
    for file in [
        &report.paths.cert_file,
        &report.paths.key_file,
        &report.paths.chain_file,
        &report.paths.fullchain_file,
        &report.paths.metadata_file,
    ] {
        assert!(file.is_file(), "missing {}", file.display());
    }

    let metadata = load_metadata(&report.paths.metadata_file).unwrap();
    assert_eq!(metadata.domain, "*.example.com");
    assert!(metadata.is_wildcard);
    assert_eq!(metadata.renewal_count, 0);
    assert_eq!(metadata.acme_server, harness.config.acme_server);

    assert_eq!(harness.dns.created(), 2);
    assert_eq!(harness.dns.live_records(), 0);
}

#[test]
fn forced_renewal_archives_and_counts() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let first = issued(
        harness
            .issue(&["api.example.com"], &engine(false, false), &issuer, IssueOptions::default())
            .unwrap(),
    );
    let first_cert = fs::read_to_string(&first.paths.cert_file).unwrap();

    let second = issued(
        harness
            .issue(&["api.example.com"], &engine(true, false), &issuer, IssueOptions::default())
            .unwrap(),
    );
    assert_eq!(second.decision, Decision::Renew);
    assert_eq!(second.renewal_count, 1);
    assert_eq!(second.archived_files, 5);

    let archived: Vec<String> = fs::read_dir(&second.paths.archive_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    let archived_cert = archived
        .iter()
        .find(|name| name.starts_with("cert-") && name.ends_with("-cert.pem"))
        .expect("archived cert.pem");
    assert_eq!(
        fs::read_to_string(second.paths.archive_dir.join(archived_cert)).unwrap(),
        first_cert
    );
    assert_ne!(fs::read_to_string(&second.paths.cert_file).unwrap(), first_cert);
}

#[test]
fn declined_renewal_leaves_slot_untouched() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let first = issued(
        harness
            .issue(&["api.example.com"], &engine(false, false), &issuer, IssueOptions::default())
            .unwrap(),
    );
    let before = fs::read_to_string(&first.paths.cert_file).unwrap();

    let outcome = harness
        .issue(&["api.example.com"], &engine(false, false), &issuer, IssueOptions::default())
        .unwrap();
    assert!(matches!(outcome, IssueOutcome::Skipped));
    assert_eq!(issuer.calls(), 1);
    assert_eq!(fs::read_to_string(&first.paths.cert_file).unwrap(), before);
    assert_eq!(fs::read_dir(&first.paths.archive_dir).unwrap().count(), 0);
}

#[test]
fn replacing_domains_resets_the_counter() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    harness
        .issue(&["api.example.com"], &engine(false, false), &issuer, IssueOptions::default())
        .unwrap();
    harness
        .issue(&["api.example.com"], &engine(true, false), &issuer, IssueOptions::default())
        .unwrap();

    let replaced = issued(
        harness
            .issue(
                &["api.example.com", "www.example.com"],
                &engine(false, true),
                &issuer,
                IssueOptions::default(),
            )
            .unwrap(),
    );
    assert_eq!(replaced.decision, Decision::Replace);
    assert_eq!(replaced.renewal_count, 0);
    let metadata = load_metadata(&replaced.paths.metadata_file).unwrap();
    assert_eq!(metadata.domains, vec!["api.example.com", "www.example.com"]);
}

#[test]
fn failed_issuance_keeps_current_generation() {
    let harness = Harness::new();
    let good = FakeIssuer::valid_for(90);
    let first = issued(
        harness
            .issue(&["api.example.com"], &engine(false, false), &good, IssueOptions::default())
            .unwrap(),
    );
    let before = fs::read_to_string(&first.paths.cert_file).unwrap();

    let bad = FakeIssuer::failing_for("api.example.com", 90);
    let err = harness
        .issue(&["api.example.com"], &engine(true, false), &bad, IssueOptions::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("incorrect TXT record"));
    assert_eq!(fs::read_to_string(&first.paths.cert_file).unwrap(), before);
    assert_eq!(harness.dns.live_records(), 0);
}

#[test]
fn unknown_zone_aborts_before_writing() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let err = harness
        .issue(&["api.example.net"], &engine(false, false), &issuer, IssueOptions::default())
        .unwrap_err();
    assert!(format!("{err:#}").contains("api.example.net"));
    assert!(list_certificates(&harness.config.cert_dir, Utc::now()).unwrap().is_empty());
}

#[test]
fn kubernetes_secret_is_written_on_request() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let report = issued(
        harness
            .issue(
                &["*.example.org"],
                &engine(false, false),
                &issuer,
                IssueOptions {
                    kubernetes_secret: true,
                },
            )
            .unwrap(),
    );
    let secret = report.kubernetes_secret.expect("secret path");
    assert_eq!(
        secret,
        report.paths.current_dir.join("wildcard-example-org-tls-secret.yaml")
    );
    let yaml = fs::read_to_string(secret).unwrap();
    assert!(yaml.contains("kubernetes.io/tls"));
}

#[test]
fn renew_batch_isolates_failures() {
    let harness = Harness::new();
    let short = FakeIssuer::valid_for(10);
    for domain in ["good.example.com", "bad.example.org"] {
        harness
            .issue(&[domain], &engine(false, false), &short, IssueOptions::default())
            .unwrap();
    }
    let long = FakeIssuer::valid_for(90);
    harness
        .issue(&["later.example.com"], &engine(false, false), &long, IssueOptions::default())
        .unwrap();

    let issuer = FakeIssuer::failing_for("bad.example.org", 90);
    let mut solver = harness.solver();
    let report = renew_certificates(
        &harness.config,
        RenewOptions::default(),
        &issuer,
        &mut solver,
        Utc::now(),
    )
    .unwrap();

    assert_eq!(report.succeeded, vec!["good.example.com"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "bad.example.org");
    assert!(report.failed[0].error.contains("incorrect TXT record"));
    assert_eq!(issuer.calls(), 2);

    let renewed = CertificatePaths::for_slot(
        &harness.config.cert_dir,
        "good.example.com",
    );
    assert_eq!(load_metadata(&renewed.metadata_file).unwrap().renewal_count, 1);
}

#[test]
fn unreadable_metadata_resets_the_counter() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let first = issued(
        harness
            .issue(&["api.example.com"], &engine(false, false), &issuer, IssueOptions::default())
            .unwrap(),
    );
    harness
        .issue(&["api.example.com"], &engine(true, false), &issuer, IssueOptions::default())
        .unwrap();
    fs::write(&first.paths.metadata_file, "{ not json").unwrap();

    let renewed = issued(
        harness
            .issue(&["api.example.com"], &engine(true, false), &issuer, IssueOptions::default())
            .unwrap(),
    );
    assert_eq!(renewed.decision, Decision::Renew);
    assert_eq!(renewed.renewal_count, 0);
    assert_eq!(load_metadata(&renewed.paths.metadata_file).unwrap().renewal_count, 0);
}

#[test]
fn metadata_write_failure_still_reports_success() {
    let harness = Harness::new();
    let issuer = FakeIssuer::valid_for(90);
    let paths = CertificatePaths::for_domains(
        &harness.config.cert_dir,
        &DomainSet::parse(&["api.example.com"]).unwrap(),
    )
    .unwrap();
    fs::create_dir_all(&paths.metadata_file).unwrap();

    let report = issued(
        harness
            .issue(&["api.example.com"], &engine(false, false), &issuer, IssueOptions::default())
            .unwrap(),
    );
    assert_eq!(report.renewal_count, 0);
    assert!(report.paths.cert_file.is_file());
    assert!(report.paths.fullchain_file.is_file());
    assert!(report.paths.metadata_file.is_dir());
    assert!(load_metadata(&report.paths.metadata_file).is_err());
}
