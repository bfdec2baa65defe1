use std::{env, thread, time::Duration};

use anyhow::{Context, Result, anyhow, ensure};
use reqwest::blocking::Client;
use serde::Deserialize;

use zonecert::issuance::dns_providers::{CLOUDFLARE_API_BASE, CloudflareClient, DnsApi};

/// A real Cloudflare zone reserved for tests, from `DNS_TEST_CLOUDFLARE_TOKEN`
/// and `DNS_TEST_CLOUDFLARE_ZONE`.
#[derive(Clone)]
pub struct LiveZone {
    pub token: String,
    pub name: String,
    pub id: String,
}

#[derive(Deserialize, Clone)]
pub struct TxtRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
struct RecordList {
    success: bool,
    result: Vec<TxtRecord>,
}

impl LiveZone {
    pub fn from_env() -> Result<Self> {
        let token = env::var("DNS_TEST_CLOUDFLARE_TOKEN")
            .context("DNS_TEST_CLOUDFLARE_TOKEN not set")?;
        let name =
            env::var("DNS_TEST_CLOUDFLARE_ZONE").context("DNS_TEST_CLOUDFLARE_ZONE not set")?;
        let id = CloudflareClient::new(token.clone())
            .list_zones(Some(&name))?
            .into_iter()
            .next()
            .map(|zone| zone.id)
            .ok_or_else(|| anyhow!("zone {name} is not visible to the test token"))?;
        Ok(Self { token, name, id })
    }

    pub fn client(&self) -> CloudflareClient {
        CloudflareClient::new(self.token.clone())
    }

    /// `_acme-challenge.integration-test.<label>.<zone>`
    pub fn record_name(&self, label: &str) -> String {
        format!("_acme-challenge.integration-test.{label}.{}", self.name)
    }

    /// TXT records with this exact name, read straight from the API.
    pub fn txt_records(&self, name: &str) -> Result<Vec<TxtRecord>> {
        let response = Client::new()
            .get(format!("{CLOUDFLARE_API_BASE}/zones/{}/dns_records", self.id))
            .query(&[("type", "TXT"), ("name", name)])
            .bearer_auth(&self.token)
            .send()
            .context("failed to list TXT records")?;
        ensure!(
            response.status().is_success(),
            "listing TXT records returned {}",
            response.status()
        );
        let list: RecordList = response.json().context("failed to parse record list")?;
        ensure!(list.success, "record list reported success=false");
        Ok(list.result)
    }

    /// Polls until a record named `name` carries `content` (already quoted).
    pub fn wait_for(&self, name: &str, content: &str) -> Result<TxtRecord> {
        for _ in 0..5 {
            if let Some(record) = self
                .txt_records(name)?
                .into_iter()
                .find(|record| record.content.as_deref() == Some(content))
            {
                return Ok(record);
            }
            thread::sleep(Duration::from_millis(400));
        }
        Err(anyhow!("no TXT record {name} with content {content}"))
    }

    pub fn purge(&self, name: &str) -> Result<()> {
        let client = self.client();
        for record in self.txt_records(name)? {
            client.delete_record(&self.id, &record.id)?;
        }
        Ok(())
    }

    /// Purges `name` now and again when the guard drops.
    pub fn guard(&self, name: &str) -> Result<RecordGuard> {
        self.purge(name)?;
        Ok(RecordGuard {
            zone: self.clone(),
            name: name.to_string(),
        })
    }
}

pub struct RecordGuard {
    zone: LiveZone,
    name: String,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        let _ = self.zone.purge(&self.name);
    }
}

pub fn quoted(value: &str) -> String {
    format!("\"{}\"", value.trim().trim_matches('"'))
}
