//! # Request Body Extraction
//!
//! Handlers take `Result<Json<T>, JsonRejection>` so that a malformed body
//! surfaces as the gateway's own [`AppError`] shape instead of Axum's plain
//! text rejection.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::AppError;

/// Business-rule checks that serde cannot express.
pub trait Validate {
    /// Returns a human-readable message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Unwrap a JSON body, mapping rejections to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Unwrap and validate a JSON body. Rule violations become
/// [`AppError::Validation`].
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TreatmentId(String);

    impl Validate for TreatmentId {
        fn validate(&self) -> Result<(), String> {
            if self.0.trim().is_empty() {
                return Err("treatment_id must not be empty".into());
            }
            Ok(())
        }
    }

    #[test]
    fn valid_body_passes_through() {
        let got = extract_validated_json(Ok(Json(TreatmentId("rat-1".into())))).unwrap();
        assert_eq!(got.0, "rat-1");
    }

    #[test]
    fn rule_violation_is_validation_error() {
        let err = extract_validated_json(Ok(Json(TreatmentId("  ".into())))).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("treatment_id")));
    }
}
