//! # pgw-cli: Operator CLI for the Partner Integration Gateway
//!
//! ## Subcommands
//!
//! - `pgw score`: Offline risk scoring and required documents for a
//!   treatment file.
//! - `pgw sign` / `pgw verify`: Webhook signatures exactly as partners
//!   receive them.
//! - `pgw keygen`: Fresh webhook secrets and API keys.
//! - `pgw check-config`: Validate a partner table before deploying it.
//! - `pgw audit-verify`: Recompute the Postgres access-audit hash chain.
//!
//! Every subcommand returns a process exit code: `0` success, `1` failure,
//! `2` a policy threshold tripped (`score --fail-at`).

pub mod audit;
pub mod config;
pub mod score;
pub mod signing;

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

/// Read a JSON or YAML document into a JSON value.
pub fn read_document(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    if is_yaml {
        serde_yaml::from_str(&text).with_context(|| format!("invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

/// Value of the environment variable `var`, rejecting unset or blank.
pub fn require_env(var: &str) -> Result<String> {
    let value = std::env::var(var).with_context(|| format!("{var} is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("{var} is empty");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("t.json");
        std::fs::write(&json_path, r#"{"subject_count": 5}"#).unwrap();
        assert_eq!(read_document(&json_path).unwrap()["subject_count"], 5);

        let yaml_path = dir.path().join("t.yaml");
        let mut f = std::fs::File::create(&yaml_path).unwrap();
        writeln!(f, "subject_count: 7\ncategories: [health]").unwrap();
        let v = read_document(&yaml_path).unwrap();
        assert_eq!(v["subject_count"], 7);
        assert_eq!(v["categories"][0], "health");
    }

    #[test]
    fn missing_file_has_context() {
        let err = read_document(Path::new("/nonexistent/treatment.json")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read"));
    }
}
