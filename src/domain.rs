use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, anyhow};

const WILDCARD_PREFIX: &str = "*.";

pub fn normalize_domain_for_storage(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }
    let (prefix, rest) = match trimmed.strip_prefix(WILDCARD_PREFIX) {
        Some(rest) => (WILDCARD_PREFIX, rest),
        None => ("", trimmed),
    };
    let ascii =
        idna::domain_to_ascii(rest).map_err(|err| anyhow!("invalid domain name: {err}"))?;
    Ok(format!("{prefix}{}", ascii.to_lowercase()))
}

/// Performs syntax checks on a requested domain. A leading `*.` is allowed.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.trim().is_empty() {
        return Err(anyhow!("domain cannot be empty"));
    }
    let bare = domain.trim().strip_prefix(WILDCARD_PREFIX).unwrap_or(domain.trim());

    if bare.contains(char::is_whitespace) {
        return Err(anyhow!("domain cannot contain spaces: {bare}"));
    }

    let labels: Vec<&str> = bare.split('.').collect();
    if labels.len() < 2 {
        return Err(anyhow!("domain must have at least two labels: {bare}"));
    }
    for label in &labels {
        if label.is_empty() {
            return Err(anyhow!("domain labels cannot be empty: {bare}"));
        }
        if label.len() > 63 {
            return Err(anyhow!("domain label too long (max 63 chars): {label}"));
        }
    }

    normalize_domain_for_storage(domain).map(|_| ())
}

pub fn is_wildcard(domain: &str) -> bool {
    domain.starts_with(WILDCARD_PREFIX)
}

/// Strips the wildcard marker so the name can be used for zone lookups.
pub fn base_domain(domain: &str) -> &str {
    domain.strip_prefix(WILDCARD_PREFIX).unwrap_or(domain)
}

/// Directory-safe name for a certificate slot.
pub fn slot_name(domain: &str) -> String {
    domain.replace("*.", "wildcard.").replace('*', "wildcard")
}

fn normalize_entry(input: &str) -> String {
    input.trim().to_lowercase()
}

/// An ordered, de-duplicated collection of lower-cased domain names.
///
/// Equality is set equality: order and repeated entries in the input do not
/// matter.
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    domains: Vec<String>,
}

impl DomainSet {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for domain in domains {
            let normalized = normalize_entry(domain.as_ref());
            if normalized.is_empty() {
                continue;
            }
            if seen.insert(normalized.clone()) {
                ordered.push(normalized);
            }
        }
        Self { domains: ordered }
    }

    /// Builds a set after validating every entry.
    pub fn parse<I, S>(domains: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raw: Vec<String> = domains
            .into_iter()
            .map(|d| d.as_ref().to_string())
            .collect();
        if raw.is_empty() {
            return Err(anyhow!("at least one domain must be specified"));
        }
        for domain in &raw {
            validate_domain(domain).map_err(|err| anyhow!("invalid domain {domain}: {err}"))?;
        }
        Ok(Self::new(raw))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.domains
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.domains.iter()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.domains.first().map(String::as_str)
    }

    pub fn contains(&self, domain: &str) -> bool {
        let normalized = normalize_entry(domain);
        self.domains.iter().any(|d| *d == normalized)
    }

    pub fn is_wildcard(&self) -> bool {
        self.domains.iter().any(|d| is_wildcard(d))
    }

    /// The identity a slot is keyed by: the first wildcard entry if any,
    /// otherwise the first entry.
    pub fn primary(&self) -> Option<&str> {
        self.domains
            .iter()
            .find(|d| is_wildcard(d))
            .or_else(|| self.domains.first())
            .map(String::as_str)
    }

    /// Short form for status lines: `example.com (+2 more)`.
    pub fn display_short(&self) -> String {
        match self.domains.len() {
            0 => String::new(),
            1 => self.domains[0].clone(),
            n => format!("{} (+{} more)", self.domains[0], n - 1),
        }
    }
}

impl PartialEq for DomainSet {
    fn eq(&self, other: &Self) -> bool {
        self.domains.len() == other.domains.len()
            && self.domains.iter().all(|d| other.domains.contains(d))
    }
}

impl Eq for DomainSet {}

impl fmt::Display for DomainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.domains.join(", "))
    }
}

impl<'a> IntoIterator for &'a DomainSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.domains.iter()
    }
}
