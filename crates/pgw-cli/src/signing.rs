//! # Signing Subcommands
//!
//! `sign` canonicalizes a JSON document and prints the body and
//! `X-Signature` value the gateway would send. `verify` checks a received
//! body byte-for-byte, the way a partner endpoint must. `keygen` prints
//! fresh webhook secrets and API keys.
//!
//! Secrets are read from environment variables, never from arguments, so
//! they do not end up in shell history.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use pgw_core::{mask_secret, CanonicalBytes};
use pgw_crypto::{sign, verify, SignatureError, WebhookSecret, SIGNATURE_HEADER};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

/// Arguments for `pgw sign`.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// Environment variable holding the webhook secret.
    #[arg(long, value_name = "VAR")]
    pub secret_env: String,
    /// JSON document to sign.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Arguments for `pgw verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Environment variable holding the webhook secret.
    #[arg(long, value_name = "VAR")]
    pub secret_env: String,
    /// Presented `X-Signature` value (64 hex characters).
    #[arg(long)]
    pub signature: String,
    /// Raw body exactly as received.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    /// Shared secret for signing webhooks (`whsec_…`).
    Webhook,
    /// Partner API key (`pk_live_…`).
    ApiKey,
}

/// Arguments for `pgw keygen`.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    #[arg(long, value_enum, default_value = "webhook")]
    pub kind: KeyKind,
}

fn load_secret(var: &str) -> Result<WebhookSecret> {
    let raw = Zeroizing::new(crate::require_env(var)?);
    WebhookSecret::new(raw.as_bytes()).with_context(|| format!("invalid secret in {var}"))
}

/// Canonical body and signature for the document at `path`.
pub fn sign_file(secret: &WebhookSecret, path: &Path) -> Result<(CanonicalBytes, String)> {
    let document = crate::read_document(path)?;
    let body = CanonicalBytes::from_value(&document).context("document cannot be canonicalized")?;
    let signature = sign(secret, &body)?;
    Ok((body, signature.as_str().to_string()))
}

/// Execute `pgw sign`.
pub fn run_sign(args: &SignArgs) -> Result<u8> {
    let secret = load_secret(&args.secret_env)?;
    let (body, signature) = sign_file(&secret, &args.file)?;
    println!("{}", body.as_str());
    println!("{SIGNATURE_HEADER}: {signature}");
    Ok(0)
}

/// Execute `pgw verify`.
pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let secret = load_secret(&args.secret_env)?;
    let body = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    match verify(&secret, &body, args.signature.trim()) {
        Ok(()) => {
            println!("OK: signature matches");
            Ok(0)
        }
        Err(SignatureError::Mismatch) => {
            println!("FAIL: signature does not match {}", args.file.display());
            Ok(1)
        }
        Err(e) => bail!("cannot verify: {e}"),
    }
}

/// A fresh partner API key: `pk_live_` + 48 hex characters.
pub fn generate_api_key() -> String {
    let mut raw = Zeroizing::new([0u8; 24]);
    OsRng.fill_bytes(&mut *raw);
    let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
    format!("pk_live_{hex}")
}

/// Execute `pgw keygen`.
pub fn run_keygen(args: &KeygenArgs) -> Result<u8> {
    let value = Zeroizing::new(match args.kind {
        KeyKind::Webhook => WebhookSecret::generate(),
        KeyKind::ApiKey => generate_api_key(),
    });
    tracing::info!(masked = %mask_secret(&value), kind = ?args.kind, "generated secret");
    println!("{}", value.as_str());
    Ok(0)
}
