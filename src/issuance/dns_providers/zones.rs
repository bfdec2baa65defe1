use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use super::{DnsApi, ZoneInfo, matches_zone};
use crate::{
    domain::base_domain,
    prompt::{Prompt, PromptError},
};

#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("no DNS zone matches {0}")]
    NoAutomaticMatch(String),
    #[error("no zones found in the DNS provider account")]
    NoZones,
    #[error("zone selection failed: {0}")]
    Selection(#[from] PromptError),
    #[error("DNS provider request failed: {0:#}")]
    Api(anyhow::Error),
}

/// Menu line for a zone: status marker, name and activation status.
pub fn zone_label(zone: &ZoneInfo) -> String {
    let marker = if zone.is_active() { "✅" } else { "⚠️" };
    format!("{marker} {} ({})", zone.name, zone.status)
}

/// Maps domain names onto provider zone identifiers.
pub struct ZoneResolver<A> {
    api: A,
    prompt: Arc<dyn Prompt>,
}

impl<A: DnsApi> ZoneResolver<A> {
    pub fn new(api: A, prompt: Arc<dyn Prompt>) -> Self {
        Self { api, prompt }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Zone id owning `domain`: automatic lookup first, then the operator.
    pub fn resolve_zone(&self, domain: &str) -> Result<String, ZoneError> {
        match self.find_zone(domain) {
            Ok(zone) => Ok(zone.id),
            Err(err) => {
                info!("[zones] automatic zone detection failed: {err}; switching to selection");
                self.select_zone(domain).map(|zone| zone.id)
            }
        }
    }

    /// Walks from the full name up to the two-label root and returns the
    /// first zone the provider reports for a candidate. Lookup errors on a
    /// candidate are logged and the walk continues.
    pub fn find_zone(&self, domain: &str) -> Result<ZoneInfo, ZoneError> {
        let bare = base_domain(domain.trim().trim_end_matches('.'));
        let labels: Vec<&str> = bare.split('.').collect();
        for i in 0..labels.len().saturating_sub(1) {
            let candidate = labels[i..].join(".");
            match self.api.list_zones(Some(&candidate)) {
                Ok(zones) => {
                    if let Some(zone) = zones.into_iter().next() {
                        debug!("[zones] {domain} belongs to zone {} ({})", zone.name, zone.id);
                        return Ok(zone);
                    }
                }
                Err(err) => debug!("[zones] lookup for {candidate} failed: {err:#}"),
            }
        }
        Err(ZoneError::NoAutomaticMatch(domain.to_string()))
    }

    /// Lists every zone, narrows to the ones covering `domain` and asks the
    /// operator when that leaves anything other than a single candidate.
    pub fn select_zone(&self, domain: &str) -> Result<ZoneInfo, ZoneError> {
        let bare = base_domain(domain.trim().trim_end_matches('.'));
        let zones = self.api.list_zones(None).map_err(ZoneError::Api)?;
        if zones.is_empty() {
            return Err(ZoneError::NoZones);
        }

        let matching: Vec<ZoneInfo> = zones
            .iter()
            .filter(|zone| matches_zone(bare, &zone.name))
            .cloned()
            .collect();
        let mut candidates = if matching.is_empty() { zones } else { matching };

        if candidates.len() == 1 {
            let zone = candidates.remove(0);
            debug!("[zones] automatically selected zone {} ({})", zone.name, zone.id);
            return Ok(zone);
        }

        let options: Vec<String> = candidates.iter().map(zone_label).collect();
        let header = format!("Available DNS zones for domain '{domain}':");
        let index = self.prompt.choose(&header, &options).map_err(|err| {
            warn!("[zones] zone selection for {domain} failed: {err}");
            ZoneError::Selection(err)
        })?;
        let zone = candidates.swap_remove(index);
        info!("[zones] selected zone {} ({})", zone.name, zone.id);
        Ok(zone)
    }
}
