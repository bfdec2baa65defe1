use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::{
    domain::{DomainSet, base_domain},
    storage::CertificatePaths,
};

pub const DEFAULT_NAMESPACE: &str = "default";
const ANNOTATION_PREFIX: &str = "zonecert.io";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TlsSecret {
    api_version: &'static str,
    kind: &'static str,
    metadata: SecretMetadata,
    #[serde(rename = "type")]
    secret_type: &'static str,
    data: BTreeMap<&'static str, String>,
}

#[derive(Serialize)]
struct SecretMetadata {
    name: String,
    namespace: String,
    labels: BTreeMap<&'static str, String>,
    annotations: BTreeMap<String, String>,
}

/// Kubernetes-safe Secret name: `*.` becomes `wildcard-`, dots become
/// dashes, and `-tls` is appended.
pub fn secret_name(primary_domain: &str) -> String {
    let name = primary_domain
        .trim()
        .to_lowercase()
        .replacen("*.", "wildcard-", 1)
        .replace('.', "-");
    format!("{}-tls", name.trim_matches('-'))
}

/// Renders a `kubernetes.io/tls` Secret manifest for PEM material.
pub fn render_tls_secret(
    domains: &DomainSet,
    namespace: &str,
    cert_pem: &[u8],
    key_pem: &[u8],
    fullchain_pem: &[u8],
    created_at: DateTime<Utc>,
) -> Result<String> {
    let primary = domains
        .primary()
        .ok_or_else(|| anyhow!("cannot render a secret without domains"))?;

    let mut labels = BTreeMap::new();
    labels.insert("app", env!("CARGO_PKG_NAME").to_string());
    labels.insert("domain", base_domain(primary).to_string());
    labels.insert("type", "tls-certificate".to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(format!("{ANNOTATION_PREFIX}/domains"), domains.to_string());
    annotations.insert(
        format!("{ANNOTATION_PREFIX}/primary-domain"),
        primary.to_string(),
    );
    annotations.insert(
        format!("{ANNOTATION_PREFIX}/created-at"),
        created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    let mut data = BTreeMap::new();
    data.insert("tls.crt", STANDARD.encode(cert_pem));
    data.insert("tls.key", STANDARD.encode(key_pem));
    data.insert("ca.crt", STANDARD.encode(fullchain_pem));

    let secret = TlsSecret {
        api_version: "v1",
        kind: "Secret",
        metadata: SecretMetadata {
            name: secret_name(primary),
            namespace: namespace.to_string(),
            labels,
            annotations,
        },
        secret_type: "kubernetes.io/tls",
        data,
    };
    serde_yaml::to_string(&secret).context("failed to render Kubernetes secret YAML")
}

/// Writes `<secret-name>-secret.yaml` for a slot's current generation into
/// `output_dir` and returns the file path.
pub fn write_tls_secret(
    paths: &CertificatePaths,
    domains: &DomainSet,
    output_dir: &Path,
    created_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let read = |path: &Path| {
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    };
    let cert = read(&paths.cert_file)?;
    let key = read(&paths.key_file)?;
    let fullchain = read(&paths.fullchain_file)?;

    let yaml = render_tls_secret(
        domains,
        DEFAULT_NAMESPACE,
        &cert,
        &key,
        &fullchain,
        created_at,
    )?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;
    let primary = domains.primary().unwrap_or_default();
    let file = output_dir.join(format!("{}-secret.yaml", secret_name(primary)));
    fs::write(&file, yaml)
        .with_context(|| format!("failed to write Kubernetes secret {}", file.display()))?;
    Ok(file)
}
