pub mod acme_workflow;
pub mod certificate;
pub mod dns_providers;
pub mod flow;
pub mod issuer;
pub mod renewal;
