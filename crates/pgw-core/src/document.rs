//! # Required Documents
//!
//! Legal documents a risk assessment obliges the controller to produce.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Kind of compliance document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// Evaluación de impacto en protección de datos (DPIA).
    Eipd,
    /// Prior consultation with the supervisory authority.
    ConsultaPrevia,
    /// Data-processing agreement for cross-border transfers.
    Dpa,
}

impl DocumentType {
    /// Return the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eipd => "EIPD",
            Self::ConsultaPrevia => "CONSULTA_PREVIA",
            Self::Dpa => "DPA",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently a document must be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Standard urgency.
    Media,
    /// High urgency.
    Alta,
    /// Must be handled before the treatment starts.
    Critica,
}

impl Urgency {
    /// Return the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Alta => "alta",
            Self::Critica => "critica",
        }
    }
}

/// A document the controller must produce, with its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredDocument {
    /// Document kind.
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    /// Urgency classification.
    pub urgency: Urgency,
    /// Days from assessment until the document is due.
    pub deadline_days: u32,
    /// Legal provision requiring the document.
    pub legal_basis_ref: String,
}

impl RequiredDocument {
    /// Due date counted from `from`.
    pub fn due_at(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + Duration::days(i64::from(self.deadline_days))
    }
}
