//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::directory::DirectoryError;
use crate::models::PatientId;
use crate::registration::{RegistrationError, RegistrationStep, ValidationError};
use crate::session::AuthError;
use crate::store::StoreError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<RegistrationStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
}

impl ErrorDetail {
    fn new(code: &'static str, message: String) -> Self {
        Self {
            code,
            message,
            missing: None,
            step: None,
            patient_id: None,
        }
    }
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Administrator role required")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The store rejected or could not complete the call; the message is its own.
    #[error("{message}")]
    DataAccess {
        message: String,
        step: Option<RegistrationStep>,
    },
    /// Patient saved, visit insert failed.
    #[error("Patient saved but visit not scheduled: {message}")]
    VisitNotScheduled {
        patient_id: PatientId,
        message: String,
    },
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("AUTH_REQUIRED", "Authentication required".to_string()),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("FORBIDDEN", "Administrator role required".to_string()),
            ),
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, ErrorDetail::new("NOT_FOUND", detail))
            }
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, ErrorDetail::new("BAD_REQUEST", detail))
            }
            ApiError::Validation(err) => {
                let mut detail = ErrorDetail::new("VALIDATION", err.to_string());
                detail.missing = Some(err.missing.iter().map(|f| f.as_str()).collect());
                (StatusCode::BAD_REQUEST, detail)
            }
            ApiError::DataAccess { message, step } => {
                tracing::warn!(step = step.map(|s| s.as_str()), "Data access failed: {message}");
                let mut detail = ErrorDetail::new("DATA_ACCESS", message);
                detail.step = step;
                (StatusCode::BAD_GATEWAY, detail)
            }
            ApiError::VisitNotScheduled {
                patient_id,
                message,
            } => {
                let mut detail = ErrorDetail::new(
                    "VISIT_NOT_SCHEDULED",
                    format!("Patient saved, but the visit was not scheduled: {message}"),
                );
                detail.patient_id = Some(patient_id);
                (StatusCode::BAD_GATEWAY, detail)
            }
            ApiError::Unavailable(detail) => {
                tracing::warn!(detail = %detail, "Upstream unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorDetail::new("UNAVAILABLE", "Service temporarily unavailable".to_string()),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetail::new("INTERNAL", "An internal error occurred".to_string()),
                )
            }
        };

        (status, Json(ErrorBody { error: detail })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transport(_)
            | StoreError::Rejected { .. }
            | StoreError::UniqueViolation { .. }
            | StoreError::MultipleRows { .. } => ApiError::DataAccess {
                message: err.to_string(),
                step: None,
            },
            StoreError::Sqlite(_)
            | StoreError::Decode { .. }
            | StoreError::InvalidQuery(_)
            | StoreError::InvalidEnum { .. }
            | StoreError::MigrationFailed { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(v) => ApiError::Validation(v),
            RegistrationError::DataAccess { step, source } => match ApiError::from(source) {
                ApiError::DataAccess { message, .. } => ApiError::DataAccess {
                    message,
                    step: Some(step),
                },
                other => other,
            },
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Forbidden => ApiError::Forbidden,
            DirectoryError::MissingName => ApiError::BadRequest(err.to_string()),
            DirectoryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DirectoryError::DataAccess(e) => ApiError::from(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => ApiError::Unauthorized,
            AuthError::Transport(detail) => ApiError::Unavailable(detail),
        }
    }
}
