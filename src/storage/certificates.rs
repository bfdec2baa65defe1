use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use log::{debug, warn};

use crate::domain::{DomainSet, slot_name};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

const CURRENT_DIR: &str = "current";
const ARCHIVE_DIR: &str = "archive";
const LOGS_DIR: &str = "logs";

const CERT_FILENAME: &str = "cert.pem";
const PRIVKEY_FILENAME: &str = "privkey.pem";
const CHAIN_FILENAME: &str = "chain.pem";
const FULLCHAIN_FILENAME: &str = "fullchain.pem";
const METADATA_FILENAME: &str = "cert.json";

pub const ARCHIVE_PREFIX: &str = "cert";

const SECRET_MODE: u32 = 0o600;
const PUBLIC_MODE: u32 = 0o644;

/// File layout of one certificate slot: `root/<slot>/{current,archive,logs}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub slot_dir: PathBuf,
    pub current_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub chain_file: PathBuf,
    pub fullchain_file: PathBuf,
    pub metadata_file: PathBuf,
}

impl CertificatePaths {
    /// Paths for the slot owning `domains`. A wildcard entry wins over the
    /// apex when both are requested.
    pub fn for_domains(root: &Path, domains: &DomainSet) -> Result<Self> {
        let primary = domains
            .primary()
            .ok_or_else(|| anyhow!("cannot derive a certificate slot from an empty domain set"))?;
        Ok(Self::for_slot(root, &slot_name(primary)))
    }

    pub fn for_slot(root: &Path, slot: &str) -> Self {
        let slot_dir = root.join(slot);
        let current_dir = slot_dir.join(CURRENT_DIR);
        Self {
            archive_dir: slot_dir.join(ARCHIVE_DIR),
            logs_dir: slot_dir.join(LOGS_DIR),
            cert_file: current_dir.join(CERT_FILENAME),
            key_file: current_dir.join(PRIVKEY_FILENAME),
            chain_file: current_dir.join(CHAIN_FILENAME),
            fullchain_file: current_dir.join(FULLCHAIN_FILENAME),
            metadata_file: current_dir.join(METADATA_FILENAME),
            current_dir,
            slot_dir,
        }
    }

    pub fn has_certificate(&self) -> bool {
        self.cert_file.is_file()
    }

    /// The five files of a live generation paired with their archive suffix.
    fn generation_files(&self) -> [(&Path, &'static str); 5] {
        [
            (self.cert_file.as_path(), CERT_FILENAME),
            (self.key_file.as_path(), PRIVKEY_FILENAME),
            (self.chain_file.as_path(), CHAIN_FILENAME),
            (self.fullchain_file.as_path(), FULLCHAIN_FILENAME),
            (self.metadata_file.as_path(), METADATA_FILENAME),
        ]
    }
}

pub fn ensure_layout(paths: &CertificatePaths) -> Result<()> {
    for dir in [&paths.current_dir, &paths.archive_dir, &paths.logs_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

/// Moves the live generation into `archive/` as `cert-<YYYYMMDD-HHMMSS>-<file>`.
///
/// Does nothing when there is no `current/cert.pem`. Missing companion files
/// are skipped one by one. A second generation archived within the same
/// second gets a `-<n>` suffix on its stamp. Returns the archive paths written.
pub fn archive_current(paths: &CertificatePaths) -> Result<Vec<PathBuf>> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    archive_current_as(paths, &stamp)
}

fn archive_current_as(paths: &CertificatePaths, stamp: &str) -> Result<Vec<PathBuf>> {
    if !paths.has_certificate() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(&paths.archive_dir).with_context(|| {
        format!(
            "failed to create archive directory {}",
            paths.archive_dir.display()
        )
    })?;

    let stamp = free_stamp(paths, stamp);
    let mut archived = Vec::new();
    for (source, suffix) in paths.generation_files() {
        if !source.exists() {
            debug!("[store] nothing to archive at {}", source.display());
            continue;
        }
        let target = paths
            .archive_dir
            .join(format!("{ARCHIVE_PREFIX}-{stamp}-{suffix}"));
        fs::rename(source, &target).with_context(|| {
            format!(
                "failed to archive {} to {}",
                source.display(),
                target.display()
            )
        })?;
        archived.push(target);
    }
    debug!(
        "[store] archived {} file(s) into {}",
        archived.len(),
        paths.archive_dir.display()
    );
    Ok(archived)
}

/// First of `stamp`, `stamp-1`, `stamp-2`, ... with no archived file yet.
fn free_stamp(paths: &CertificatePaths, stamp: &str) -> String {
    let taken = |candidate: &str| {
        paths.generation_files().iter().any(|(_, suffix)| {
            paths
                .archive_dir
                .join(format!("{ARCHIVE_PREFIX}-{candidate}-{suffix}"))
                .exists()
        })
    };
    if !taken(stamp) {
        return stamp.to_string();
    }
    (1u32..)
        .map(|n| format!("{stamp}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| stamp.to_string())
}

/// Writes a new generation into `current/`.
///
/// The leaf and key are written owner-only. The chain is trimmed and ends in
/// exactly one newline, or is empty. `fullchain.pem` is the leaf bytes
/// followed by the chain bytes as written.
pub fn save(
    paths: &CertificatePaths,
    cert_pem: &[u8],
    key_pem: &[u8],
    issuer_pem: &[u8],
) -> Result<()> {
    fs::create_dir_all(&paths.current_dir).with_context(|| {
        format!(
            "failed to create certificate directory {}",
            paths.current_dir.display()
        )
    })?;

    let chain = normalize_chain(issuer_pem);
    let mut fullchain = Vec::with_capacity(cert_pem.len() + chain.len());
    fullchain.extend_from_slice(cert_pem);
    fullchain.extend_from_slice(&chain);

    write_file(&paths.cert_file, cert_pem, SECRET_MODE)?;
    write_file(&paths.key_file, key_pem, SECRET_MODE)?;
    write_file(&paths.chain_file, &chain, PUBLIC_MODE)?;
    write_file(&paths.fullchain_file, &fullchain, PUBLIC_MODE)?;
    Ok(())
}

fn normalize_chain(issuer_pem: &[u8]) -> Vec<u8> {
    let trimmed = issuer_pem.trim_ascii();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut chain = trimmed.to_vec();
    chain.push(b'\n');
    chain
}

/// Deletes archive files last modified before `now - retention_days`.
///
/// `retention_days <= 0` disables cleanup and a missing directory is not an
/// error. A file that cannot be removed is logged and skipped. Returns the
/// number of files removed.
pub fn cleanup_archive(archive_dir: &Path, retention_days: i64, now: SystemTime) -> Result<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let entries = match fs::read_dir(archive_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read archive directory {}", archive_dir.display())
            });
        }
    };

    let retention = Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("[store] failed to read archive entry: {err}");
                continue;
            }
        };
        let path = entry.path();
        let modified = match entry.metadata() {
            Ok(meta) if meta.is_dir() => continue,
            Ok(meta) => match meta.modified() {
                Ok(modified) => modified,
                Err(err) => {
                    warn!("[store] no modification time for {}: {err}", path.display());
                    continue;
                }
            },
            Err(err) => {
                warn!("[store] failed to stat {}: {err}", path.display());
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("[store] removed expired archive file {}", path.display());
                removed += 1;
            }
            Err(err) => warn!(
                "[store] failed to remove old archive file {}: {err}",
                path.display()
            ),
        }
    }
    Ok(removed)
}

/// A slot directory holding a live certificate.
#[derive(Debug, Clone)]
pub struct SlotEntry {
    pub name: String,
    pub paths: CertificatePaths,
}

/// Lists slots under `root` that have a `current/cert.pem`, sorted by name.
/// A missing root yields an empty list.
pub fn list_slots(root: &Path) -> Result<Vec<SlotEntry>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read certificate directory {}", root.display())
            });
        }
    };

    let mut slots = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let paths = CertificatePaths::for_slot(root, &name);
        if paths.has_certificate() {
            slots.push(SlotEntry { name, paths });
        }
    }
    slots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(slots)
}

fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(mode);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    ensure_permissions(path, mode)
}

fn ensure_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let current = fs::metadata(path)?.permissions();
        if current.mode() & 0o777 != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode)).with_context(|| {
                format!("failed to set permissions on {}", path.display())
            })?;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
        if let Err(err) = fs::metadata(path) {
            warn!(
                "[store] unable to confirm permissions for {}: {}",
                path.display(),
                err
            );
        }
    }
    Ok(())
}
