use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};

use zonecert::issuance::dns_providers::{
    CHALLENGE_TTL, ChallengeProvider, CloudflareClient, DnsApi, ZoneResolver,
};
use zonecert::issuance::issuer::{Dns01Solver, IssuanceChallenge};
use zonecert::prompt::FixedAnswer;

use super::test_utils::{LiveZone, quoted};

#[test]
fn cloudflare_token_and_zone_listing() -> Result<()> {
    let zone = LiveZone::from_env()?;
    let client = zone.client();
    client.verify_token()?;
    let zones = client.list_zones(None)?;
    ensure!(
        zones.iter().any(|z| z.id == zone.id),
        "zone {} missing from unfiltered listing",
        zone.name
    );
    Ok(())
}

#[test]
fn cloudflare_create_then_delete_txt() -> Result<()> {
    let zone = LiveZone::from_env()?;
    let name = zone.record_name("create");
    let _guard = zone.guard(&name)?;

    let client = zone.client();
    let id = client.create_txt_record(&zone.id, &name, "integration-test-create", CHALLENGE_TTL)?;
    let record = zone.wait_for(&name, &quoted("integration-test-create"))?;
    ensure!(record.id == id, "expected record {id}, found {}", record.id);
    ensure!(record.name == name, "expected name {name}, found {}", record.name);

    client.delete_record(&zone.id, &id)?;
    std::thread::sleep(Duration::from_millis(500));
    ensure!(
        zone.txt_records(&name)?.iter().all(|r| r.id != id),
        "record {id} still present"
    );

    // Deleting again hits a 404, which counts as success.
    client.delete_record(&zone.id, &id)
}

#[test]
fn cloudflare_challenge_provider_round_trip() -> Result<()> {
    let zone = LiveZone::from_env()?;
    let domain = format!("integration-test.challenge.{}", zone.name);
    let challenge = IssuanceChallenge::dns01(&domain, "token", "key-authorization");
    let record_name = challenge.record_name();
    let _guard = zone.guard(&record_name)?;

    let resolver = ZoneResolver::new(zone.client(), Arc::new(FixedAnswer(false)));
    let mut provider = ChallengeProvider::new(resolver, Duration::ZERO, Duration::from_secs(60));
    provider.present(&challenge)?;
    zone.wait_for(&record_name, &quoted(challenge.record_value()))?;

    provider.clean_up(&challenge)?;
    ensure!(provider.pending_records() == 0, "record still tracked after cleanup");
    Ok(())
}

#[test]
fn cloudflare_rejects_invalid_token() -> Result<()> {
    let err = CloudflareClient::new("invalid-token")
        .verify_token()
        .expect_err("expected invalid token error");
    let message = format!("{err:#}").to_lowercase();
    if !message.contains("authentication") && !message.contains("400") {
        return Err(anyhow!("unexpected error for invalid token: {message}"));
    }
    Ok(())
}
