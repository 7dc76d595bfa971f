//! # Audit-Verify Subcommand
//!
//! Connects to `DATABASE_URL` and recomputes the `access_audit` hash chain,
//! reporting broken links and rows whose content no longer matches their
//! stored hash.

use anyhow::{Context, Result};
use clap::Args;
use pgw_api::db::audit::{ChainIntegrityResult, PgAuditStore};
use sqlx::postgres::PgPoolOptions;

/// Arguments for `pgw audit-verify`.
#[derive(Args, Debug)]
pub struct AuditVerifyArgs {
    /// Oldest entries to check.
    #[arg(long, default_value_t = 100_000)]
    pub limit: i64,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute `pgw audit-verify`.
pub fn run_audit_verify(args: &AuditVerifyArgs) -> Result<u8> {
    let url = crate::require_env("DATABASE_URL")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(async {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        PgAuditStore::new(pool)
            .verify_chain(args.limit)
            .await
            .context("failed to read access_audit")
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(if result.chain_valid { 0 } else { 1 })
}

fn print_summary(result: &ChainIntegrityResult) {
    let verdict = if result.chain_valid { "OK" } else { "FAIL" };
    println!("{verdict}: {} audit entries checked", result.total_entries);
    println!("  broken links:     {}", result.broken_links);
    println!("  tampered entries: {}", result.tampered_entries.len());
    for seq in &result.tampered_entries {
        println!("  - seq {seq}");
    }
}
