use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::debug;

use zonecert::config::{Config, DEFAULT_CERT_DIR, KeyType, expand_home, parse_dns_timeout};
use zonecert::core::commands::{
    ExportTarget, IssueOptions, RenewOptions, cloudflare_solver, export_certificates,
    find_renewal_candidates, format_certificate_table, format_zone_table, issue_certificate,
    list_certificates, list_zones, renew_certificates,
};
use zonecert::core::types::{BatchReport, IssueOutcome};
use zonecert::domain::DomainSet;
use zonecert::issuance::acme_workflow::AcmeIssuer;
use zonecert::issuance::dns_providers::CloudflareClient;
use zonecert::issuance::renewal::{RENEWAL_WINDOW_DAYS, RenewalDecisionEngine};
use zonecert::prompt::{Prompt, TerminalPrompt};

/// Issue and renew TLS certificates for Cloudflare-hosted domains over DNS-01.
#[derive(Parser, Debug)]
#[command(name = "zonecert", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Certificate storage root
    #[arg(long, global = true, env = "CERT_DIR", default_value = DEFAULT_CERT_DIR)]
    cert_dir: PathBuf,

    /// Use the Let's Encrypt staging directory
    #[arg(long, global = true)]
    staging: bool,

    /// ACME directory URL
    #[arg(long, global = true, env = "ACME_SERVER")]
    acme_server: Option<String>,

    /// Contact email for the ACME account
    #[arg(long, global = true, env = "ACME_EMAIL")]
    acme_email: Option<String>,

    /// Cloudflare API token with Zone:Read and DNS:Edit permissions
    #[arg(long, global = true, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    cloudflare_api_token: Option<String>,

    /// Cloudflare account email (informational)
    #[arg(long, global = true, env = "CLOUDFLARE_EMAIL")]
    cloudflare_email: Option<String>,

    /// Upper bound in seconds for DNS challenge validation
    #[arg(long, global = true, env = "DNS_PROPAGATION_TIMEOUT")]
    dns_timeout: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obtain or renew a certificate for one or more domains
    Cert(CertArgs),
    /// List stored certificates
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Renew stored certificates that are about to expire
    Renew {
        /// Renew certificates expiring within this many days
        #[arg(long, default_value_t = RENEWAL_WINDOW_DAYS)]
        days: i64,
        /// Renew every stored certificate
        #[arg(long)]
        all: bool,
    },
    /// Export stored certificates as Kubernetes TLS secrets
    Export {
        /// Export the certificate covering this domain
        #[arg(short, long)]
        domain: Option<String>,
        /// Export every stored certificate
        #[arg(long)]
        all: bool,
        /// Directory for the generated manifests
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the DNS zones visible to the API token
    Zones,
    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct CertArgs {
    /// Domain to include (repeatable, e.g. -d example.com -d '*.example.com')
    #[arg(short = 'd', long = "domain", required = true)]
    domains: Vec<String>,

    /// Renew without prompting
    #[arg(long)]
    force: bool,

    /// Also write a Kubernetes TLS secret manifest
    #[arg(long)]
    k8s: bool,

    /// Private key type: rsa2048, rsa4096, ec256 or ec384
    #[arg(long, default_value = "rsa2048")]
    key_type: KeyType,
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "warn,zonecert=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}

fn build_config(cli: &Cli) -> Config {
    let defaults = Config::default();
    Config {
        cloudflare_api_token: cli.cloudflare_api_token.clone(),
        cloudflare_email: cli.cloudflare_email.clone(),
        acme_email: cli.acme_email.clone(),
        acme_server: cli
            .acme_server
            .clone()
            .filter(|server| !server.trim().is_empty())
            .unwrap_or(defaults.acme_server.clone()),
        cert_dir: expand_home(&cli.cert_dir),
        dns_timeout: parse_dns_timeout(cli.dns_timeout.as_deref()),
        ..defaults
    }
    .with_staging(cli.staging)
}

fn issuer_for(config: &Config) -> AcmeIssuer {
    AcmeIssuer::new(
        &config.acme_server,
        config.acme_email.as_deref().unwrap_or_default(),
        config.key_type,
    )
}

fn run_cert(mut config: Config, args: CertArgs) -> Result<()> {
    config.key_type = args.key_type;
    config.force_renew = args.force;
    let domains = DomainSet::parse(&args.domains)?;
    config.validate_for_issuance()?;
    if let Some(email) = &config.cloudflare_email {
        debug!("[cli] Cloudflare account: {email}");
    }

    let prompt: Arc<dyn Prompt> = Arc::new(TerminalPrompt::stdio());
    let mut solver = cloudflare_solver(&config, prompt.clone())?;
    let issuer = issuer_for(&config);
    let engine = RenewalDecisionEngine::new(config.force_renew, prompt);

    println!("Requesting certificate for {domains}");
    let options = IssueOptions {
        kubernetes_secret: args.k8s,
    };
    match issue_certificate(&config, &domains, &engine, &issuer, &mut solver, options, Utc::now())? {
        IssueOutcome::Skipped => {
            println!("Certificate generation cancelled. Use --force to renew without prompting.");
        }
        IssueOutcome::Issued(report) => {
            println!("✅ Certificate saved to {}", report.paths.current_dir.display());
            println!("   Expires: {}", report.not_after.format("%Y-%m-%d %H:%M UTC"));
            if let Some(secret) = report.kubernetes_secret {
                println!("   Kubernetes secret: {}", secret.display());
            }
        }
    }
    Ok(())
}

fn run_list(config: &Config, json: bool) -> Result<()> {
    let certs = list_certificates(&config.cert_dir, Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&certs)?);
    } else if certs.is_empty() {
        println!("No certificates found in {}", config.cert_dir.display());
    } else {
        print!("{}", format_certificate_table(&certs));
    }
    Ok(())
}

fn run_renew(config: Config, options: RenewOptions) -> Result<()> {
    let now = Utc::now();
    if find_renewal_candidates(&config.cert_dir, options, now)?.is_empty() {
        println!("No certificates need renewal.");
        return Ok(());
    }
    config.validate_for_issuance()?;

    let prompt: Arc<dyn Prompt> = Arc::new(TerminalPrompt::stdio());
    let mut solver = cloudflare_solver(&config, prompt)?;
    let issuer = issuer_for(&config);
    let report = renew_certificates(&config, options, &issuer, &mut solver, now)?;
    print_batch_summary("Renewed", &report);
    Ok(())
}

fn run_export(
    config: &Config,
    domain: Option<String>,
    all: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let Some(target) = ExportTarget::from_flags(domain, all)? else {
        let certs = list_certificates(&config.cert_dir, Utc::now())?;
        if certs.is_empty() {
            println!("No certificates found in {}", config.cert_dir.display());
        } else {
            println!("Available certificates:");
            for cert in &certs {
                println!("  {} ({})", cert.slot, cert.domains.join(", "));
            }
            println!("\nUse --domain <name> or --all to export.");
        }
        return Ok(());
    };

    let output = output.map(|dir| expand_home(&dir));
    let report = export_certificates(&config.cert_dir, &target, output.as_deref(), Utc::now())?;
    print_batch_summary("Exported", &report);
    Ok(())
}

fn run_zones(config: &Config) -> Result<()> {
    let client = CloudflareClient::new(config.api_token()?);
    let zones = list_zones(&client)?;
    if zones.is_empty() {
        println!("No zones visible to this token.");
    } else {
        print!("{}", format_zone_table(&zones));
    }
    Ok(())
}

fn print_batch_summary(verb: &str, report: &BatchReport) {
    for name in &report.succeeded {
        println!("✅ {name}");
    }
    for failure in &report.failed {
        println!("❌ {}: {}", failure.name, failure.error);
    }
    println!("{verb} {} of {} certificate(s)", report.succeeded.len(), report.total());
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli);
    debug!("[cli] storage root {}", config.cert_dir.display());
    match cli.command {
        Command::Cert(args) => run_cert(config, args),
        Command::List { json } => run_list(&config, json),
        Command::Renew { days, all } => run_renew(config, RenewOptions { days, all }),
        Command::Export {
            domain,
            all,
            output,
        } => run_export(&config, domain, all, output),
        Command::Zones => run_zones(&config),
        Command::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
