use anyhow::{Context, Result};
use log::info;

use crate::issuance::dns_providers::{DnsApi, ZoneInfo};

/// Verifies the credentials, then lists every zone the token can see.
pub fn list_zones<A: DnsApi>(api: &A) -> Result<Vec<ZoneInfo>> {
    api.verify_token().context("API token verification failed")?;
    let zones = api.list_zones(None).context("failed to list zones")?;
    info!("[zones] {} zone(s) visible to the token", zones.len());
    Ok(zones)
}

pub fn format_zone_table(zones: &[ZoneInfo]) -> String {
    let mut out = format!("{:<10} {:<40} {}\n", "STATUS", "ZONE", "ID");
    out.push_str(&format!("{}\n", "-".repeat(84)));
    for zone in zones {
        out.push_str(&format!("{:<10} {:<40} {}\n", zone.status, zone.name, zone.id));
    }
    out
}
