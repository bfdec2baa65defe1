use std::sync::Arc;

use anyhow::Result;

use crate::domain::normalize_domain_for_storage;

mod challenge;
mod cloudflare;
pub(crate) mod http;
pub(crate) mod zones;

pub use challenge::{CHALLENGE_TTL, ChallengeProvider, POLL_INTERVAL};
pub use cloudflare::{CLOUDFLARE_API_BASE, CloudflareClient};
pub use zones::{ZoneError, ZoneResolver, zone_label};

/// A DNS zone as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl ZoneInfo {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// The DNS provider operations the certificate workflow relies on.
pub trait DnsApi {
    fn verify_token(&self) -> Result<()>;
    /// Lists zones, restricted to an exact zone name when `name` is given.
    fn list_zones(&self, name: Option<&str>) -> Result<Vec<ZoneInfo>>;
    /// Creates a TXT record and returns the provider's record identifier.
    fn create_txt_record(&self, zone_id: &str, name: &str, content: &str, ttl: u32)
    -> Result<String>;
    fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()>;
}

impl<T: DnsApi + ?Sized> DnsApi for &T {
    fn verify_token(&self) -> Result<()> {
        (**self).verify_token()
    }

    fn list_zones(&self, name: Option<&str>) -> Result<Vec<ZoneInfo>> {
        (**self).list_zones(name)
    }

    fn create_txt_record(
        &self,
        zone_id: &str,
        name: &str,
        content: &str,
        ttl: u32,
    ) -> Result<String> {
        (**self).create_txt_record(zone_id, name, content, ttl)
    }

    fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        (**self).delete_record(zone_id, record_id)
    }
}

impl<T: DnsApi + ?Sized> DnsApi for Arc<T> {
    fn verify_token(&self) -> Result<()> {
        (**self).verify_token()
    }

    fn list_zones(&self, name: Option<&str>) -> Result<Vec<ZoneInfo>> {
        (**self).list_zones(name)
    }

    fn create_txt_record(
        &self,
        zone_id: &str,
        name: &str,
        content: &str,
        ttl: u32,
    ) -> Result<String> {
        (**self).create_txt_record(zone_id, name, content, ttl)
    }

    fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        (**self).delete_record(zone_id, record_id)
    }
}

/// True when `zone_name` is `domain` itself or one of its dotted suffixes.
pub(crate) fn matches_zone(domain: &str, zone_name: &str) -> bool {
    let domain = match normalize_domain_for_storage(domain) {
        Ok(value) => value,
        Err(_) => return false,
    };
    let zone_name = match normalize_domain_for_storage(zone_name) {
        Ok(value) => value,
        Err(_) => return false,
    };
    zone_name == domain || domain.ends_with(&format!(".{}", zone_name))
}
