//! # pgw CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pgw_cli::audit::{run_audit_verify, AuditVerifyArgs};
use pgw_cli::config::{run_check_config, CheckConfigArgs};
use pgw_cli::score::{run_score, ScoreArgs};
use pgw_cli::signing::{run_keygen, run_sign, run_verify, KeygenArgs, SignArgs, VerifyArgs};

/// Partner integration gateway operator CLI.
///
/// Offline scoring, webhook signature tooling, secret generation, partner
/// table validation, and audit chain verification.
#[derive(Parser, Debug)]
#[command(name = "pgw", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a treatment file and list required documents.
    Score(ScoreArgs),

    /// Canonicalize and sign a JSON document as a webhook body.
    Sign(SignArgs),

    /// Verify a webhook signature over a received body.
    Verify(VerifyArgs),

    /// Generate a webhook secret or partner API key.
    Keygen(KeygenArgs),

    /// Validate a partner table.
    CheckConfig(CheckConfigArgs),

    /// Verify the Postgres access-audit hash chain.
    AuditVerify(AuditVerifyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Score(args) => run_score(args),
        Commands::Sign(args) => run_sign(args),
        Commands::Verify(args) => run_verify(args),
        Commands::Keygen(args) => run_keygen(args),
        Commands::CheckConfig(args) => run_check_config(args),
        Commands::AuditVerify(args) => run_audit_verify(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
