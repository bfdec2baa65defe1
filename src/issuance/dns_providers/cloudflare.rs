use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{RequestBuilder, Response};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use super::{DnsApi, ZoneInfo, http};

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const PROVIDER: &str = "Cloudflare";
const ZONES_PER_PAGE: u32 = 50;

/// Cloudflare v4 API client authenticated with a scoped API token.
pub struct CloudflareClient {
    api_token: String,
    base_url: String,
}

#[derive(Deserialize)]
struct CloudflareResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
    result: Option<T>,
    result_info: Option<CloudflareResultInfo>,
}

#[derive(Deserialize)]
struct CloudflareError {
    code: u32,
    message: String,
}

#[derive(Deserialize)]
struct CloudflareResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Deserialize)]
struct CloudflareZone {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct CloudflareTokenStatus {
    #[serde(default)]
    status: String,
}

#[derive(Serialize)]
struct CloudflareDnsRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
}

#[derive(Deserialize)]
struct CloudflareRecordId {
    id: String,
}

impl CloudflareClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE)
    }

    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn format_txt_content(value: &str) -> String {
        let trimmed = value.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            trimmed.to_string()
        } else {
            format!("\"{}\"", trimmed.trim_matches('"'))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .with_context(|| format!("failed to {action}"))
    }

    fn envelope<T: DeserializeOwned>(
        response: Response,
        action: &str,
    ) -> Result<CloudflareResponse<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(http::status_error(PROVIDER, status, &body))
                .with_context(|| format!("failed to {action}"));
        }
        response
            .json()
            .with_context(|| format!("failed to parse {PROVIDER} response to {action}"))
    }

    fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        let envelope = Self::envelope(response, action)?;
        Self::unwrap_envelope(envelope, action).map(|(result, _)| result)
    }

    fn unwrap_envelope<T>(
        envelope: CloudflareResponse<T>,
        action: &str,
    ) -> Result<(T, Option<CloudflareResultInfo>)> {
        if !envelope.success {
            let detail = if envelope.errors.is_empty() {
                "unknown error".to_string()
            } else {
                envelope
                    .errors
                    .iter()
                    .map(|err| format!("{}: {}", err.code, err.message))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(anyhow!("{PROVIDER} API error while trying to {action}: {detail}"));
        }
        let result = envelope
            .result
            .ok_or_else(|| anyhow!("{PROVIDER} API returned no result for {action}"))?;
        Ok((result, envelope.result_info))
    }
}

impl DnsApi for CloudflareClient {
    fn verify_token(&self) -> Result<()> {
        let client = http::shared_client();
        let response = self.send(
            client.get(self.url("/user/tokens/verify")),
            "verify API token",
        )?;
        let token: CloudflareTokenStatus = Self::parse(response, "verify API token")?;
        if token.status != "active" {
            return Err(anyhow!(
                "{PROVIDER} API token is not active (status: {})",
                token.status
            ));
        }
        debug!("[cloudflare] API token verified");
        Ok(())
    }

    fn list_zones(&self, name: Option<&str>) -> Result<Vec<ZoneInfo>> {
        let client = http::shared_client();
        let mut zones = Vec::new();
        let mut page = 1u32;
        loop {
            let mut query = vec![
                ("per_page".to_string(), ZONES_PER_PAGE.to_string()),
                ("page".to_string(), page.to_string()),
            ];
            if let Some(name) = name {
                query.push(("name".to_string(), name.to_string()));
            }
            let response = self.send(client.get(self.url("/zones")).query(&query), "list zones")?;
            let envelope: CloudflareResponse<Vec<CloudflareZone>> =
                Self::envelope(response, "list zones")?;
            let (result, info) = Self::unwrap_envelope(envelope, "list zones")?;
            zones.extend(result.into_iter().map(|zone| ZoneInfo {
                id: zone.id,
                name: zone.name,
                status: zone.status,
            }));

            let total_pages = info.map(|info| info.total_pages).unwrap_or(1);
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        debug!(
            "[cloudflare] listed {} zone(s){}",
            zones.len(),
            name.map(|n| format!(" named {n}")).unwrap_or_default()
        );
        Ok(zones)
    }

    fn create_txt_record(
        &self,
        zone_id: &str,
        name: &str,
        content: &str,
        ttl: u32,
    ) -> Result<String> {
        let client = http::shared_client();
        let record = CloudflareDnsRecord {
            record_type: "TXT",
            name,
            content: Self::format_txt_content(content),
            ttl,
        };
        let response = self.send(
            client
                .post(self.url(&format!("/zones/{zone_id}/dns_records")))
                .json(&record),
            "create DNS record",
        )?;
        let created: CloudflareRecordId = Self::parse(response, "create DNS record")?;
        debug!("[cloudflare] created TXT record {name} ({})", created.id);
        Ok(created.id)
    }

    fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let client = http::shared_client();
        let response = self.send(
            client.delete(self.url(&format!("/zones/{zone_id}/dns_records/{record_id}"))),
            "delete DNS record",
        )?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("[cloudflare] record {record_id} already deleted (404)");
            return Ok(());
        }
        let envelope: CloudflareResponse<IgnoredAny> =
            Self::envelope(response, "delete DNS record")?;
        if !envelope.success {
            Self::unwrap_envelope(envelope, "delete DNS record")?;
        }
        debug!("[cloudflare] deleted record {record_id}");
        Ok(())
    }
}
