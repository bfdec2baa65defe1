mod export;
mod issue;
mod list;
mod renew;
mod zones;

pub use export::{ExportTarget, export_certificates};
pub use issue::{IssueOptions, cloudflare_solver, issue_certificate};
pub use list::{format_certificate_table, list_certificates, truncate};
pub use renew::{RenewOptions, find_renewal_candidates, renew_certificates};
pub use zones::{format_zone_table, list_zones};
