//! # Check-Config Subcommand
//!
//! Loads a partner table with the same validation the server runs at boot
//! and prints a summary, or every problem found.
//!
//! With `--placeholder-secrets`, `*_env` references resolve to dummy values
//! so a table can be checked in CI without the real secrets.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pgw_api::bootstrap::{BootstrapError, PartnerTable};

/// Arguments for `pgw check-config`.
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Partner table YAML.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Resolve secret references to placeholders instead of the environment.
    #[arg(long)]
    pub placeholder_secrets: bool,
}

/// Load the table at `args.file`.
pub fn load_table(args: &CheckConfigArgs) -> Result<Result<PartnerTable, BootstrapError>> {
    let yaml = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let table = if args.placeholder_secrets {
        PartnerTable::from_yaml_str(&yaml, |var| Some(format!("placeholder-{var}")))
    } else {
        PartnerTable::from_yaml_str(&yaml, |var| std::env::var(var).ok())
    };
    Ok(table)
}

/// Execute `pgw check-config`.
pub fn run_check_config(args: &CheckConfigArgs) -> Result<u8> {
    match load_table(args)? {
        Ok(table) => {
            println!("OK: {}", args.file.display());
            println!("  partners:        {}", table.profiles.len());
            println!("  api keys:        {}", table.bindings.len());
            println!("  webhook targets: {}", table.webhook_targets.len());
            for profile in &table.profiles {
                let features: Vec<&str> =
                    profile.enabled_features.iter().map(String::as_str).collect();
                println!(
                    "  - {} ({}) tier={} features=[{}]",
                    profile.partner_type,
                    profile.display_name,
                    profile.tier,
                    features.join(", ")
                );
            }
            Ok(0)
        }
        Err(BootstrapError::InvalidTable { errors }) => {
            println!("FAIL: {} ({} problems)", args.file.display(), errors.len());
            for error in errors {
                println!("  - {error}");
            }
            Ok(1)
        }
        Err(e) => {
            println!("FAIL: {}: {e}", args.file.display());
            Ok(1)
        }
    }
}
