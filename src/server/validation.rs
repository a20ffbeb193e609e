//! Request validation utilities for the admin and client APIs.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::server::api_error::ApiError;

/// Validation error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use licensehub::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("", "name").is_err());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.chars().count();
    if len < min {
        Err(ValidationError::new(
            field_name,
            format!("must be at least {min} characters"),
        ))
    } else if len > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {max} characters"),
        ))
    } else {
        Ok(())
    }
}

/// Validate a plausible email address (`local@domain.tld`).
///
/// # Example
/// ```
/// use licensehub::server::validation::validate_email;
///
/// assert!(validate_email("ops@example.com", "email").is_ok());
/// assert!(validate_email("not-an-email", "email").is_err());
/// ```
pub fn validate_email(value: &str, field_name: &str) -> ValidationResult<()> {
    let matches = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(value))
        .unwrap_or(false);

    if matches {
        Ok(())
    } else {
        Err(ValidationError::new(field_name, "must be a valid email address"))
    }
}

/// Validate an activation limit.
pub fn validate_max_activations(value: i64, field_name: &str) -> ValidationResult<()> {
    if value < 1 {
        Err(ValidationError::new(field_name, "must be at least 1"))
    } else {
        Ok(())
    }
}

/// Parse an ISO 8601 timestamp into naive UTC.
///
/// Accepts formats:
/// - RFC 3339: `2025-12-31T23:59:59Z`
/// - Without timezone: `2025-12-31T23:59:59` (fractional seconds allowed)
/// - Space separated: `2025-12-31 23:59:59`
/// - Date only: `2025-12-31`, which means the end of that day
pub fn parse_datetime(value: &str, field_name: &str) -> ValidationResult<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }

    if let Some(end_of_day) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
    {
        return Ok(end_of_day);
    }

    Err(ValidationError::new(
        field_name,
        "invalid datetime format (expected: ISO 8601, e.g., '2025-12-31T23:59:59Z' or '2025-12-31')",
    ))
}

/// Treat an empty or whitespace-only optional field as absent.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
