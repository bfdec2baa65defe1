//! Blocking HTTP plumbing shared by DNS provider clients.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::anyhow;
use log::warn;
use reqwest::StatusCode;
use reqwest::blocking::Client;

/// Per-request timeout override, in seconds.
pub const TIMEOUT_ENV: &str = "ZONECERT_HTTP_TIMEOUT_SECS";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Process-wide client, built on first use.
pub fn shared_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        let timeout = request_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref());
        Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!("[http] falling back to a default client: {err}");
                Client::new()
            })
    })
}

/// Zero or unparseable values fall back to the default.
pub fn request_timeout(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_TIMEOUT;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            warn!("[http] ignoring {TIMEOUT_ENV}={raw:?}");
            DEFAULT_TIMEOUT
        }
    }
}

/// Coarse classes of a failed provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unauthorized,
    RateLimited,
    Other,
}

impl Failure {
    pub fn of(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Failure::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Failure::RateLimited,
            _ => Failure::Other,
        }
    }
}

pub fn status_error(provider: &str, status: StatusCode, body: &str) -> anyhow::Error {
    let body = body.trim();
    match Failure::of(status) {
        Failure::Unauthorized => anyhow!("{provider} authentication failed ({status})"),
        Failure::RateLimited => anyhow!("{provider} rate limit exceeded, try again later"),
        Failure::Other if body.is_empty() => anyhow!("{provider} API error: {status}"),
        Failure::Other => anyhow!("{provider} API error ({status}): {body}"),
    }
}
