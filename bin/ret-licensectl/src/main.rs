//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "binary"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Vendor CLI for license keys, issuance, and inspection."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ret_common::config::{AppConfig, LoadedAppConfig};
use ret_common::license::{product_validator, start_license_service};
use ret_common::logging::init_tracing;
use ret_licensing::entitlement::{EntitlementSnapshot, EntitlementSummary, Severity};
use ret_licensing::keys::read_public_key;
use ret_licensing::{ensure_key_pair, LicenseError, LicenseValidator, StaticUsage, UsageSnapshot};
use tracing::debug;

mod issue;

const CONFIG_CANDIDATES: &[&str] = &["ret-licensing.toml", "config/ret-licensing.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Retenciones license issuance and inspection utility",
    long_about = None
)]
struct Cli {
    /// Configuration file (overrides RET_CONFIG and the default locations).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the issuer key pair if needed and print the public key.
    Keygen {
        /// Key directory (defaults to issuer.key_dir).
        #[arg(long, value_name = "DIR")]
        key_dir: Option<PathBuf>,
    },
    /// Interactively issue a single license.
    Issue(issue::IssueCommand),
    /// Issue every request in a JSON file.
    IssueBatch(issue::BatchCommand),
    /// Validate a license file and print its details.
    Inspect {
        /// License file to validate.
        file: PathBuf,
        /// Base64 public key file to verify against instead of the configured key.
        #[arg(long, value_name = "FILE")]
        public_key_file: Option<PathBuf>,
    },
    /// Bootstrap the product-side license state and print the active entitlement.
    Status {
        #[arg(long, default_value_t = 0)]
        users: u64,
        #[arg(long, default_value_t = 0)]
        records: u64,
        #[arg(long, default_value_t = 0)]
        companies: u64,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(cli.config.as_deref())?;
    init_tracing("ret-licensectl", &loaded.config.logging)?;
    if let Some(source) = &loaded.source {
        debug!(config_path = %source.display(), "configuration loaded");
    }
    let config = loaded.config;

    match cli.command {
        Commands::Keygen { key_dir } => keygen(key_dir.unwrap_or(config.issuer.key_dir)),
        Commands::Issue(cmd) => cmd.execute(&config),
        Commands::IssueBatch(cmd) => cmd.execute(&config),
        Commands::Inspect {
            file,
            public_key_file,
        } => inspect(&file, public_key_file.as_deref()),
        Commands::Status {
            users,
            records,
            companies,
            json,
        } => status(&config, UsageSnapshot::new(users, records, companies), json),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<LoadedAppConfig> {
    match explicit {
        Some(path) => Ok(LoadedAppConfig {
            config: AppConfig::from_file(path)?,
            source: Some(path.to_path_buf()),
        }),
        None => AppConfig::load_with_source(CONFIG_CANDIDATES),
    }
}

fn keygen(key_dir: PathBuf) -> Result<()> {
    let key_pair = ensure_key_pair(&key_dir)
        .with_context(|| format!("unable to prepare signing keys in {}", key_dir.display()))?;
    let bytes = key_pair.public_key_bytes();
    println!("Private key : {}", key_pair.private_path().display());
    println!("Public key  : {}", key_pair.public_path().display());
    println!("Fingerprint : {}", key_pair.fingerprint());
    println!("Base64      : {}", key_pair.public_key_base64());
    println!(
        "Embed as    : [{}]",
        bytes
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Build the product with RET_LICENSE_PUBLIC_KEY set to the base64 value to trust this key.");
    Ok(())
}

fn inspect(file: &Path, public_key_file: Option<&Path>) -> Result<()> {
    let validator = match public_key_file {
        Some(path) => LicenseValidator::with_public_key(
            read_public_key(path)
                .with_context(|| format!("unable to read public key {}", path.display()))?,
        ),
        None => product_validator(),
    };

    let verified = match validator.load_file(file) {
        Ok(verified) => verified,
        Err(LicenseError::Expired { license, .. }) => *license,
        Err(err) => {
            println!("{}", err.user_message());
            return Err(anyhow!(err).context(format!("{} is not a valid license", file.display())));
        }
    };

    let snapshot = EntitlementSnapshot::new(
        ret_licensing::Entitlement::Verified(verified),
        UsageSnapshot::default(),
    );
    let record = snapshot.entitlement.record();
    println!("License key     : {}", record.license_key());
    println!("Activation code : {}", record.activation_code());
    println!("Issued by       : {}", record.metadata.issued_by);
    print_summary(&snapshot.summary());
    Ok(())
}

fn status(config: &AppConfig, usage: UsageSnapshot, json: bool) -> Result<()> {
    let source = Arc::new(StaticUsage::new(usage.users, usage.records, usage.companies));
    let service = start_license_service(config, source);
    let summary = service.snapshot().summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &EntitlementSummary) {
    println!("License id      : {}", summary.license_id);
    println!("Company         : {}", summary.company);
    println!("Tier            : {}", summary.tier);
    println!("Trust           : {}", summary.trust);
    println!(
        "Expires         : {} ({} day(s) left{})",
        summary.expires_at.format("%Y-%m-%d"),
        summary.remaining_days,
        if summary.expired { ", EXPIRED" } else { "" }
    );
    println!(
        "Usage           : {} / {} records, {} / {} users, {} / {} companies",
        summary.usage.records,
        quota(summary.limits.max_records),
        summary.usage.users,
        quota(summary.limits.max_users),
        summary.usage.companies,
        quota(summary.limits.max_companies),
    );
    let enabled: Vec<&str> = summary
        .features
        .iter()
        .filter(|(_, enabled)| **enabled)
        .map(|(name, _)| name.as_str())
        .collect();
    println!(
        "Features        : {}",
        if enabled.is_empty() {
            "none".to_owned()
        } else {
            enabled.join(", ")
        }
    );
    if let Some(warning) = &summary.warning {
        let label = match warning.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        println!("{label}: {}", warning.message);
    }
}

fn quota(limit: i64) -> String {
    if limit == ret_licensing::UNLIMITED {
        "unlimited".to_owned()
    } else {
        limit.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn inspect_accepts_public_key_file() {
        let cli = Cli::try_parse_from([
            "ret-licensectl",
            "inspect",
            "RET-BAS-2501-QWERTY-0A1B.json",
            "--public-key-file",
            "keys/license_signing.pub",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Inspect {
                public_key_file: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn unlimited_quota_is_spelled_out() {
        assert_eq!(quota(-1), "unlimited");
        assert_eq!(quota(1000), "1000");
    }
}
