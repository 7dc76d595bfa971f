//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//!
//! Partner-facing messages are Spanish, matching the rest of the partner
//! contract. Every error body has the same flat shape:
//!
//! ```json
//! { "error": "No autorizado", "code": 401, "details": "API key inválida o ausente" }
//! ```
//!
//! Internal error details are logged and never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgw_webhook::{DispatchError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::audit::AuditStoreError;

/// Structured JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Short human-readable summary.
    pub error: String,
    /// HTTP status code, repeated in the body.
    pub code: u16,
    /// Additional context for client errors. Omitted for 5xx.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Human-readable wait before retrying, present on 429.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
}

impl ErrorBody {
    /// Body with no details.
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: status.as_u16(),
            details: None,
            retry_after: None,
        }
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404). Also used for resources owned by another
    /// partner so their existence is not revealed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401). The details are fixed so that
    /// missing and invalid keys cannot be told apart.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated partner lacks the feature (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded or client blocked (429).
    #[error("too many requests, retry after {retry_after}")]
    TooManyRequests {
        /// Formatted wait, e.g. "15 minutos".
        retry_after: String,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Details returned on every 401.
pub const UNAUTHORIZED_DETAILS: &str = "API key inválida o ausente";

impl AppError {
    /// HTTP status and the short Spanish summary for this error.
    fn status_and_summary(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "Recurso no encontrado"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Solicitud inválida"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "Solicitud mal formada"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "No autorizado"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "Acceso denegado"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "Conflicto de estado"),
            Self::TooManyRequests { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "Demasiadas solicitudes")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Error interno"),
        }
    }

    /// The response body for this error.
    pub fn body(&self) -> ErrorBody {
        let (status, summary) = self.status_and_summary();
        let body = ErrorBody::new(status, summary);
        match self {
            Self::NotFound(d)
            | Self::Validation(d)
            | Self::BadRequest(d)
            | Self::Forbidden(d)
            | Self::Conflict(d) => body.with_details(d.clone()),
            Self::Unauthorized => body.with_details(UNAUTHORIZED_DETAILS),
            Self::TooManyRequests { retry_after } => ErrorBody {
                retry_after: Some(retry_after.clone()),
                ..body
            },
            Self::Internal(_) => body,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_summary();

        if let Self::Internal(message) = &self {
            tracing::error!(error = %message, "internal server error");
        }

        (status, Json(self.body())).into_response()
    }
}

impl From<pgw_core::ValidationError> for AppError {
    fn from(err: pgw_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => {
                Self::Conflict(format!("la integración {id} fue modificada por otra solicitud"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AuditStoreError> for AppError {
    fn from(err: AuditStoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Dispatch errors that are not delivery failures. Delivery failures are
/// reported in the response body, so handlers match them out first.
impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound(id) => {
                Self::NotFound(format!("integración {id} no encontrada"))
            }
            DispatchError::NotRetryable { status, .. } => Self::Conflict(format!(
                "solo se pueden reintentar integraciones en estado ERROR (estado actual: {status})"
            )),
            DispatchError::Store(store) => store.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                AppError::TooManyRequests {
                    retry_after: "1 minuto".into(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_and_summary().0, expected, "{err}");
            assert_eq!(err.body().code, expected.as_u16());
        }
    }

    #[test]
    fn unauthorized_body_is_fixed() {
        let body = AppError::Unauthorized.body();
        assert_eq!(body.error, "No autorizado");
        assert_eq!(body.code, 401);
        assert_eq!(body.details.as_deref(), Some(UNAUTHORIZED_DETAILS));
        assert!(body.retry_after.is_none());
    }

    #[test]
    fn internal_details_are_hidden() {
        let body = AppError::Internal("db password=hunter2 rejected".into()).body();
        assert_eq!(body.code, 500);
        assert!(body.details.is_none());
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn too_many_requests_carries_retry_after() {
        let body = AppError::TooManyRequests {
            retry_after: "15 minutos".into(),
        }
        .body();
        assert_eq!(body.retry_after.as_deref(), Some("15 minutos"));
        assert_eq!(body.error, "Demasiadas solicitudes");
    }

    #[test]
    fn not_retryable_maps_to_conflict() {
        let err: AppError = DispatchError::NotRetryable {
            id: uuid::Uuid::nil(),
            status: pgw_core::IntegrationStatus::Sent,
        }
        .into();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("SENT")));
    }

    #[test]
    fn store_conflict_maps_to_conflict() {
        let err: AppError = DispatchError::Store(StoreError::Conflict(uuid::Uuid::nil())).into();
        assert!(matches!(err, AppError::Conflict(_)));
        let err: AppError = StoreError::Backend("down".into()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn validation_error_converts() {
        let err: AppError = pgw_core::ValidationError::EmptyTier.into();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
