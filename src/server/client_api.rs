//! Client-facing activation and validation endpoints.
//!
//! - `POST /activate` binds a license to a device, within the license's
//!   activation limit.
//! - `POST /validate` checks that a previously activated device may still
//!   run.
//!
//! Every attempt is recorded in the validation log with the outcome that
//! decided it. Unknown keys are looked up in the remote registry and imported
//! before being rejected.

use axum::{extract::State, Json};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::LicenseResult;
use crate::server::api_error::{ApiError, ErrorCode};
use crate::license_key::validate_license_key_format;
use crate::server::database::{ActivationOutcome, License, ValidationStatus};
use crate::server::handlers::AppState;
use crate::server::logging::{log_license_event, LicenseEvent};

/// Detail returned for an unknown key on activation.
pub const INVALID_KEY_MESSAGE: &str = "Invalid license key. Please check and try again.";

/// Detail returned for an unknown key on validation.
pub const KEY_NOT_FOUND_MESSAGE: &str = "License not found or has been deleted";

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub license_key: String,
    pub hardware_fingerprint: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivateResponse {
    pub success: bool,
    pub message: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub license_key: String,
    pub hardware_fingerprint: String,
}

/// Why a validation came back negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    RemoteDisabled,
    Blocked,
    Expired,
    NotActivated,
}

/// Body of `POST /validate`. Negative answers are still `200 OK`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

impl ValidateResponse {
    fn rejected(reason: InvalidReason, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Find a license locally, importing it from the remote registry on a miss.
///
/// Keys that do not match the configured key format never reach the registry.
pub async fn find_or_import_license(
    state: &AppState,
    license_key: &str,
) -> LicenseResult<Option<License>> {
    if let Some(license) = state.db.get_license(license_key).await? {
        return Ok(Some(license));
    }

    if !validate_license_key_format(license_key, &state.license_keys) {
        debug!(license_key = %license_key, "Malformed license key, skipping remote lookup");
        return Ok(None);
    }

    info!(license_key = %license_key, "License not found locally, checking remote");
    let Some(remote) = state.remote.fetch_license(license_key).await else {
        return Ok(None);
    };

    match remote.to_new_license() {
        Ok(row) => {
            state.db.import_license(&row).await?;
            log_license_event(LicenseEvent::Imported, license_key, None);
        }
        Err(e) => {
            warn!(license_key = %license_key, "Import error: {e}");
            return Ok(None);
        }
    }

    state.db.get_license(license_key).await
}

/// Record a refusal and build the matching error.
async fn refuse(
    state: &AppState,
    request: &ActivateRequest,
    status: ValidationStatus,
    log_message: Option<&str>,
    error: ApiError,
) -> ApiError {
    if let Err(e) = state
        .db
        .log_validation(
            &request.license_key,
            &request.hardware_fingerprint,
            status,
            status == ValidationStatus::RemoteDisabled,
            log_message,
        )
        .await
    {
        warn!("Failed to write validation log: {e}");
    }

    log_license_event(
        LicenseEvent::ValidationFailed,
        &request.license_key,
        Some(status.as_str()),
    );
    error
}

/// `POST /activate`
///
/// Checks run in a fixed order and the first failure wins: existence,
/// remote override, hardware binding, block, expiry, existing activation,
/// activation limit.
pub async fn activate_handler(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>, ApiError> {
    let license = find_or_import_license(&state, &request.license_key)
        .await?
        .ok_or_else(|| ApiError::with_message(ErrorCode::LicenseNotFound, INVALID_KEY_MESSAGE))?;

    let remote = state.remote.check_override(&request.license_key).await;
    if !remote.allowed {
        let message = remote
            .message
            .clone()
            .unwrap_or_else(|| ErrorCode::RemoteDisabled.default_message().to_string());
        return Err(refuse(
            &state,
            &request,
            ValidationStatus::RemoteDisabled,
            remote.message.as_deref(),
            ApiError::with_message(ErrorCode::RemoteDisabled, message),
        )
        .await);
    }

    let Some(bound_fingerprint) = license.restricted_fingerprint.as_deref() else {
        return Err(refuse(
            &state,
            &request,
            ValidationStatus::NotImplemented,
            None,
            ApiError::new(ErrorCode::BindingMissing),
        )
        .await);
    };

    if bound_fingerprint != request.hardware_fingerprint {
        let note = format!("License is strictly bound to machine {bound_fingerprint}");
        return Err(refuse(
            &state,
            &request,
            ValidationStatus::HardwareMismatch,
            Some(&note),
            ApiError::new(ErrorCode::HardwareMismatch),
        )
        .await);
    }

    if license.is_blocked {
        let message = license
            .block_message
            .clone()
            .unwrap_or_else(|| ErrorCode::LicenseBlocked.default_message().to_string());
        return Err(refuse(
            &state,
            &request,
            ValidationStatus::Blocked,
            None,
            ApiError::with_message(ErrorCode::LicenseBlocked, message),
        )
        .await);
    }

    let now = Utc::now().naive_utc();
    if license.is_expired_at(now) {
        return Err(refuse(
            &state,
            &request,
            ValidationStatus::Expired,
            None,
            ApiError::new(ErrorCode::LicenseExpired),
        )
        .await);
    }

    let device_name = request
        .device_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let outcome = state
        .db
        .activate_if_allowed(
            &request.license_key,
            &request.hardware_fingerprint,
            device_name,
            license.max_activations,
        )
        .await?;

    let message = match outcome {
        ActivationOutcome::LimitReached => {
            return Err(refuse(
                &state,
                &request,
                ValidationStatus::MaxActivations,
                None,
                ApiError::with_message(
                    ErrorCode::ActivationLimit,
                    format!("Maximum activations ({}) reached", license.max_activations),
                ),
            )
            .await);
        }
        ActivationOutcome::AlreadyActive => "Already activated on this device",
        ActivationOutcome::Created(_) => {
            log_license_event(LicenseEvent::Activated, &request.license_key, device_name);
            "License activated successfully"
        }
    };

    state
        .db
        .log_validation(
            &request.license_key,
            &request.hardware_fingerprint,
            ValidationStatus::Valid,
            false,
            None,
        )
        .await?;

    Ok(Json(ActivateResponse {
        success: true,
        message: message.to_string(),
        expires_at: license.expires_at,
    }))
}

/// `POST /validate`
pub async fn validate_handler(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let key = request.license_key.as_str();
    let fingerprint = request.hardware_fingerprint.as_str();

    let remote = state.remote.check_override(key).await;
    if !remote.allowed {
        state
            .db
            .log_validation(
                key,
                fingerprint,
                ValidationStatus::RemoteDisabled,
                true,
                remote.message.as_deref(),
            )
            .await?;
        log_license_event(LicenseEvent::ValidationFailed, key, Some("remote_disabled"));

        let message = remote
            .message
            .unwrap_or_else(|| ErrorCode::RemoteDisabled.default_message().to_string());
        return Ok(Json(ValidateResponse {
            is_blocked: Some(true),
            ..ValidateResponse::rejected(InvalidReason::RemoteDisabled, message)
        }));
    }

    let Some(license) = find_or_import_license(&state, key).await? else {
        state
            .db
            .log_validation(key, fingerprint, ValidationStatus::NotFound, false, None)
            .await?;
        return Err(ApiError::with_message(
            ErrorCode::LicenseNotFound,
            KEY_NOT_FOUND_MESSAGE,
        ));
    };

    if license.is_blocked {
        state
            .db
            .log_validation(key, fingerprint, ValidationStatus::Blocked, false, None)
            .await?;
        log_license_event(LicenseEvent::ValidationFailed, key, Some("blocked"));

        let message = license
            .block_message
            .unwrap_or_else(|| ErrorCode::LicenseBlocked.default_message().to_string());
        return Ok(Json(ValidateResponse {
            is_blocked: Some(true),
            ..ValidateResponse::rejected(InvalidReason::Blocked, message)
        }));
    }

    let now = Utc::now().naive_utc();
    if license.is_expired_at(now) {
        state
            .db
            .log_validation(key, fingerprint, ValidationStatus::Expired, false, None)
            .await?;
        log_license_event(LicenseEvent::ValidationFailed, key, Some("expired"));

        return Ok(Json(ValidateResponse {
            expired_at: Some(license.expires_at),
            ..ValidateResponse::rejected(
                InvalidReason::Expired,
                ErrorCode::LicenseExpired.default_message(),
            )
        }));
    }

    let Some(activation) = state.db.find_active_activation(key, fingerprint).await? else {
        state
            .db
            .log_validation(key, fingerprint, ValidationStatus::NotActivated, false, None)
            .await?;
        log_license_event(LicenseEvent::ValidationFailed, key, Some("not_activated"));

        return Ok(Json(ValidateResponse::rejected(
            InvalidReason::NotActivated,
            "License not activated on this device",
        )));
    };

    state.db.touch_last_validated(activation.id).await?;
    state
        .db
        .log_validation(key, fingerprint, ValidationStatus::Valid, false, None)
        .await?;
    log_license_event(LicenseEvent::Validated, key, None);

    Ok(Json(ValidateResponse {
        valid: true,
        is_blocked: Some(false),
        expires_at: Some(license.expires_at),
        days_remaining: Some((license.expires_at - now).num_days()),
        customer_name: Some(license.customer_name),
        company_name: license.company_name,
        ..ValidateResponse::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_response_omits_success_fields() {
        let json = serde_json::to_value(ValidateResponse::rejected(
            InvalidReason::NotActivated,
            "License not activated on this device",
        ))
        .unwrap();

        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "not_activated");
        assert!(json.get("days_remaining").is_none());
        assert!(json.get("is_blocked").is_none());
    }
}
