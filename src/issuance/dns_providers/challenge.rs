use std::{collections::HashMap, thread, time::Duration};

use anyhow::{Context, Result};
use log::{debug, info};

use super::{DnsApi, ZoneResolver};
use crate::issuance::issuer::{Dns01Solver, IssuanceChallenge};

pub const CHALLENGE_TTL: u32 = 60;
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// DNS-01 solver that publishes proof records through a [`DnsApi`].
///
/// Record ids are tracked per challenge token for the lifetime of one
/// issuance. The table is not synchronized, so one instance must not serve
/// overlapping issuances.
pub struct ChallengeProvider<A> {
    resolver: ZoneResolver<A>,
    records: HashMap<String, String>,
    propagation_delay: Duration,
    timeout: Duration,
}

impl<A: DnsApi> ChallengeProvider<A> {
    pub fn new(resolver: ZoneResolver<A>, propagation_delay: Duration, timeout: Duration) -> Self {
        Self {
            resolver,
            records: HashMap::new(),
            propagation_delay,
            timeout,
        }
    }

    /// Number of records created and not yet cleaned up.
    pub fn pending_records(&self) -> usize {
        self.records.len()
    }
}

impl<A: DnsApi> Dns01Solver for ChallengeProvider<A> {
    fn present(&mut self, challenge: &IssuanceChallenge) -> Result<()> {
        let name = challenge.record_name();
        let value = challenge.record_value();
        debug!("[challenge] creating TXT record {name} = {value}");

        let zone_id = self
            .resolver
            .resolve_zone(&challenge.domain)
            .with_context(|| format!("failed to determine zone for domain {}", challenge.domain))?;
        let record_id = self
            .resolver
            .api()
            .create_txt_record(&zone_id, &name, value, CHALLENGE_TTL)
            .with_context(|| format!("failed to create DNS record {name}"))?;
        self.records.insert(challenge.token.clone(), record_id.clone());
        info!("[challenge] created DNS record {record_id} for {}", challenge.domain);

        if !self.propagation_delay.is_zero() {
            debug!(
                "[challenge] waiting {}s for DNS propagation",
                self.propagation_delay.as_secs()
            );
            thread::sleep(self.propagation_delay);
        }
        Ok(())
    }

    fn clean_up(&mut self, challenge: &IssuanceChallenge) -> Result<()> {
        let Some(record_id) = self.records.get(&challenge.token).cloned() else {
            debug!(
                "[challenge] no record for token {}, skipping cleanup",
                challenge.token
            );
            return Ok(());
        };

        let zone_id = self
            .resolver
            .resolve_zone(&challenge.domain)
            .with_context(|| format!("failed to determine zone for domain {}", challenge.domain))?;
        self.resolver
            .api()
            .delete_record(&zone_id, &record_id)
            .with_context(|| format!("failed to delete DNS record {record_id}"))?;
        self.records.remove(&challenge.token);
        debug!("[challenge] cleaned up DNS record {record_id}");
        Ok(())
    }

    fn timeout(&self) -> (Duration, Duration) {
        (self.timeout, POLL_INTERVAL)
    }
}
