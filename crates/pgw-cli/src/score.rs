//! # Score Subcommand
//!
//! Runs the same scoring and document resolution as `POST /v1/risk/score`
//! on a local file, with the default weights and thresholds.
//!
//! The file holds either a bare treatment description or a submission
//! envelope with a `treatment` field.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use pgw_compliance::evaluate;
use pgw_core::{RiskLevel, TreatmentDescription};
use serde_json::{json, Value};

/// Arguments for `pgw score`.
#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Treatment file (JSON, or YAML with a .yaml/.yml extension).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Exit with code 2 when the level is at or above this one.
    #[arg(long, value_name = "LEVEL", value_parser = parse_level)]
    pub fail_at: Option<RiskLevel>,

    /// Compute due dates from this instant instead of now (RFC 3339).
    #[arg(long, value_name = "TIMESTAMP")]
    pub from: Option<DateTime<Utc>>,
}

fn parse_level(raw: &str) -> Result<RiskLevel, String> {
    serde_json::from_value(Value::String(raw.trim().to_uppercase()))
        .map_err(|_| format!("unknown risk level \"{raw}\" (BAJO, MEDIO, ALTO, CRITICO)"))
}

/// Pull the treatment description out of a bare or enveloped document.
pub fn treatment_from(document: Value) -> Result<TreatmentDescription> {
    let inner = match document {
        Value::Object(mut map) if map.contains_key("treatment") => {
            map.remove("treatment").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(inner).context("document is not a treatment description")
}

/// Score and render the report printed by `pgw score`.
pub fn report(treatment: &TreatmentDescription, from: DateTime<Utc>) -> (RiskLevel, Value) {
    let (assessment, documents) = evaluate(treatment);
    let documents: Vec<Value> = documents
        .iter()
        .map(|d| {
            json!({
                "type": d.document_type.as_str(),
                "urgency": d.urgency.as_str(),
                "deadline_days": d.deadline_days,
                "legal_basis_ref": d.legal_basis_ref,
                "due_at": d.due_at(from),
            })
        })
        .collect();
    let level = assessment.level;
    (
        level,
        json!({
            "risk": assessment,
            "required_documents": documents,
        }),
    )
}

/// Execute `pgw score`.
pub fn run_score(args: &ScoreArgs) -> Result<u8> {
    let treatment = treatment_from(crate::read_document(&args.file)?)?;
    let (level, report) = report(&treatment, args.from.unwrap_or_else(Utc::now));
    println!("{}", serde_json::to_string_pretty(&report)?);

    match args.fail_at {
        Some(threshold) if level >= threshold => {
            tracing::warn!(%level, %threshold, "risk level at or above threshold");
            Ok(2)
        }
        _ => Ok(0),
    }
}
