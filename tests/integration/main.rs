#[cfg(feature = "integration-tests")]
mod dns_providers;

mod issue_flow;
