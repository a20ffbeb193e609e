//! Error responses shared by the admin and client endpoints.
//!
//! Every error is serialized as
//!
//! ```json
//! { "detail": "License not found", "code": "LICENSE_NOT_FOUND" }
//! ```
//!
//! `detail` is the human-readable message the dashboard shows to the
//! operator; `code` is stable and meant for programmatic handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === License State Errors ===
    /// License key was not found
    LicenseNotFound,
    /// License has expired
    LicenseExpired,
    /// License has been blocked by an administrator
    LicenseBlocked,
    /// The remote registry disabled this license
    RemoteDisabled,
    /// License has no hardware binding on record
    BindingMissing,
    /// Request fingerprint doesn't match the bound device
    HardwareMismatch,
    /// All activation slots are in use
    ActivationLimit,

    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A field value is invalid
    InvalidField,

    // === Authentication Errors (401) ===
    /// No bearer token supplied
    NotAuthenticated,
    /// Bearer token is not a live session
    InvalidToken,
    /// Username or password is wrong
    InvalidCredentials,

    // === Resource Errors ===
    /// Requested resource was not found
    NotFound,

    // === Server Errors (5xx) ===
    /// Database operation failed
    DatabaseError,
    /// Server configuration error
    ConfigError,
    /// Remote registry communication failed
    NetworkError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::InvalidField => StatusCode::BAD_REQUEST,

            ErrorCode::NotAuthenticated
            | ErrorCode::InvalidToken
            | ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,

            ErrorCode::LicenseExpired
            | ErrorCode::LicenseBlocked
            | ErrorCode::RemoteDisabled
            | ErrorCode::BindingMissing
            | ErrorCode::HardwareMismatch
            | ErrorCode::ActivationLimit => StatusCode::FORBIDDEN,

            ErrorCode::LicenseNotFound | ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::DatabaseError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::LicenseNotFound => "License not found",
            ErrorCode::LicenseExpired => "License has expired",
            ErrorCode::LicenseBlocked => "License is blocked",
            ErrorCode::RemoteDisabled => "License disabled by administrator",
            ErrorCode::BindingMissing => "License is missing hardware binding secure data.",
            ErrorCode::HardwareMismatch => {
                "Activation Failed: This license is already bound to a different machine."
            }
            ErrorCode::ActivationLimit => "Maximum activations reached",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::NotAuthenticated => "Not authenticated",
            ErrorCode::InvalidToken => "Invalid token",
            ErrorCode::InvalidCredentials => "Invalid credentials",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::NetworkError => "Failed to communicate with the license registry",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message
    pub detail: String,
    /// Machine-readable error code
    pub code: ErrorCode,
}

impl ApiError {
    /// Creates a new API error with the code's default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            detail: code.default_message().to_string(),
            code,
        }
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            detail: message.into(),
            code,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // === Convenience constructors for common errors ===

    pub fn license_not_found() -> Self {
        Self::new(ErrorCode::LicenseNotFound)
    }

    /// Invalid value for a named request field.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_message(
            ErrorCode::InvalidField,
            format!("Invalid value for '{field}': {reason}"),
        )
    }

    /// Resource not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::with_message(ErrorCode::NotFound, format!("{resource} not found"))
    }

    /// Database error (internal details hidden from client).
    pub fn database_error() -> Self {
        Self::new(ErrorCode::DatabaseError)
    }

    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.detail)
    }
}

impl std::error::Error for ApiError {}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::InvalidLicense(msg) => {
                ApiError::with_message(ErrorCode::InvalidRequest, msg)
            }
            LicenseError::ConfigError(msg) => ApiError::with_message(ErrorCode::ConfigError, msg),
            LicenseError::NetworkError(e) => {
                ApiError::with_message(ErrorCode::NetworkError, e.to_string())
            }
            LicenseError::DatabaseError(msg) => {
                error!("database failure surfaced to client: {msg}");
                ApiError::database_error()
            }
            LicenseError::ServerError(msg) => {
                error!("server failure surfaced to client: {msg}");
                ApiError::internal_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(
            ErrorCode::LicenseNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::InvalidField.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::NotAuthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::ActivationLimit.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn serializes_detail_and_code() {
        let err = ApiError::license_not_found();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["detail"], "License not found");
        assert_eq!(json["code"], "LICENSE_NOT_FOUND");
    }

    #[test]
    fn database_errors_hide_internals() {
        let api_err: ApiError =
            LicenseError::DatabaseError("no such table: licenses".to_string()).into();
        assert_eq!(api_err.code, ErrorCode::DatabaseError);
        assert!(!api_err.detail.contains("licenses"));
    }
}
