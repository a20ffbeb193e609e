//! Admin API handlers for license management.
//!
//! Every endpoint except login requires an [`AdminSession`]
//! (`Authorization: Bearer <token>`).
//!
//! # Endpoints
//!
//! - `POST /admin/login` - Exchange credentials for a session token
//! - `POST /admin/logout` - End the current session
//! - `GET /admin/stats` - Dashboard counters
//! - `POST /admin/generate` - Issue a new license
//! - `GET /admin/licenses` - List licenses (`limit`, `offset`, `updated_after`)
//! - `GET /admin/licenses/{license_key}` - A license with its activations
//! - `DELETE /admin/licenses/{license_key}` - Delete a license and its activations
//! - `POST /admin/block` - Block a license
//! - `POST /admin/unblock?license_key=` - Unblock a license
//! - `POST /admin/extend` - Move a license's expiry
//! - `GET /admin/activations` - Latest activations across all licenses
//! - `DELETE /admin/activation/{id}` - Deactivate one device

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::license_key::generate_unique_license_key;
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::auth::{verify_password, AdminSession};
use crate::server::database::{Activation, ActivationRow, License, LicenseRow, LicenseStats, NewLicense};
use crate::server::handlers::AppState;
use crate::server::logging::{log_license_event, LicenseEvent};
use crate::server::remote::RemoteLicense;
use crate::server::validation::{
    normalize_optional, parse_datetime, validate_email, validate_length,
    validate_max_activations, validate_not_empty,
};

/// Block message used when the admin doesn't supply one.
pub const DEFAULT_BLOCK_MESSAGE: &str = "License has been blocked by administrator";

/// Rows returned by `GET /admin/activations`.
pub const ACTIVATION_LIST_LIMIT: i64 = 100;

const MAX_PAGE_SIZE: i64 = 1000;
const KEY_GENERATION_ATTEMPTS: u32 = 10;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// Generic acknowledgement for mutating endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

/// Request body for `POST /admin/generate`.
#[derive(Debug, Deserialize)]
pub struct LicenseCreate {
    pub customer_name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// ISO 8601 timestamp or `YYYY-MM-DD` (end of that day)
    pub expires_at: String,
    #[serde(default = "default_max_activations")]
    pub max_activations: i64,
    pub restricted_fingerprint: String,
    pub notes: Option<String>,
}

fn default_max_activations() -> i64 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub license_key: String,
    pub id: i64,
    pub message: String,
}

/// Query parameters for listing licenses.
#[derive(Debug, Deserialize)]
pub struct ListLicensesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Only licenses touched strictly after this instant
    pub updated_after: Option<String>,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct LicenseListResponse {
    pub licenses: Vec<LicenseRow>,
    /// Number of licenses in this page
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct LicenseDetailResponse {
    pub license: License,
    pub activations: Vec<Activation>,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub license_key: String,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnblockQuery {
    pub license_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub license_key: String,
    pub new_expiry: String,
}

#[derive(Debug, Serialize)]
pub struct ActivationListResponse {
    pub activations: Vec<ActivationRow>,
}

impl LicenseCreate {
    /// Validate and normalize the form into an insertable row.
    fn into_new_license(
        self,
        license_key: String,
        created_by: &str,
        now: NaiveDateTime,
    ) -> Result<NewLicense, ApiError> {
        validate_not_empty(&self.customer_name, "customer_name")?;
        validate_length(&self.customer_name, 1, 255, "customer_name")?;
        validate_not_empty(&self.restricted_fingerprint, "restricted_fingerprint")?;
        validate_length(&self.restricted_fingerprint, 1, 255, "restricted_fingerprint")?;
        validate_max_activations(self.max_activations, "max_activations")?;

        let email = normalize_optional(self.email);
        if let Some(email) = email.as_deref() {
            validate_email(email, "email")?;
        }

        let expires_at = parse_datetime(&self.expires_at, "expires_at")?;

        Ok(NewLicense {
            license_key,
            customer_name: self.customer_name.trim().to_string(),
            company_name: normalize_optional(self.company_name),
            email,
            phone: normalize_optional(self.phone),
            expires_at,
            max_activations: self.max_activations,
            restricted_fingerprint: Some(self.restricted_fingerprint.trim().to_string()),
            notes: normalize_optional(self.notes),
            created_by: Some(created_by.to_string()),
            generated_at: now,
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /admin/login`
pub async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    info!(username = %payload.username, "Login attempt");

    let user = match state.db.get_admin_user(&payload.username).await? {
        Some(user) => user,
        None => {
            warn!(username = %payload.username, "Login failed: unknown user");
            return Err(ApiError::new(ErrorCode::InvalidCredentials));
        }
    };

    if !verify_password(&payload.password, &user.password_hash) {
        warn!(username = %payload.username, "Login failed: password mismatch");
        return Err(ApiError::new(ErrorCode::InvalidCredentials));
    }

    let token = state.sessions.create(&user.username).await;
    info!(username = %user.username, "Login successful");

    Ok(Json(LoginResponse {
        token,
        username: user.username,
    }))
}

/// `POST /admin/logout`
pub async fn logout_handler(
    State(state): State<AppState>,
    session: AdminSession,
) -> Json<MessageResponse> {
    state.sessions.revoke(&session.token).await;
    info!(username = %session.username, "Logged out");
    MessageResponse::ok("Logged out")
}

/// `GET /admin/stats`
pub async fn stats_handler(
    State(state): State<AppState>,
    _session: AdminSession,
) -> Result<Json<LicenseStats>, ApiError> {
    let stats = state.db.stats(Utc::now().naive_utc()).await?;
    Ok(Json(stats))
}

/// `POST /admin/generate`
///
/// The new license is pushed to the remote registry before responding; a
/// failed push is logged and does not fail the request.
pub async fn generate_license_handler(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<LicenseCreate>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let db = state.db.clone();
    let license_key = generate_unique_license_key(
        &state.license_keys,
        |key| {
            let db = db.clone();
            async move { db.license_key_exists(&key).await }
        },
        KEY_GENERATION_ATTEMPTS,
    )
    .await?;

    let now = Utc::now().naive_utc();
    let new_license = payload.into_new_license(license_key.clone(), &session.username, now)?;
    let id = state.db.insert_license(&new_license).await?;

    log_license_event(
        LicenseEvent::Generated,
        &license_key,
        Some(&format!("by {}", session.username)),
    );

    if let Some(license) = state.db.get_license(&license_key).await? {
        if let Err(e) = state.remote.push_license(&RemoteLicense::from(&license)).await {
            warn!(license_key = %license_key, "Remote sync error: {e}");
        }
    }

    Ok(Json(GenerateResponse {
        success: true,
        license_key,
        id,
        message: "License generated successfully".to_string(),
    }))
}

/// `GET /admin/licenses`
pub async fn list_licenses_handler(
    State(state): State<AppState>,
    _session: AdminSession,
    Query(query): Query<ListLicensesQuery>,
) -> Result<Json<LicenseListResponse>, ApiError> {
    if query.limit < 1 || query.limit > MAX_PAGE_SIZE {
        return Err(ApiError::invalid_field(
            "limit",
            &format!("must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    if query.offset < 0 {
        return Err(ApiError::invalid_field("offset", "must not be negative"));
    }

    let updated_after = query
        .updated_after
        .as_deref()
        .map(|raw| parse_datetime(raw, "updated_after"))
        .transpose()?;

    let licenses = state
        .db
        .list_licenses(query.limit, query.offset, updated_after)
        .await?;

    Ok(Json(LicenseListResponse {
        total: licenses.len(),
        licenses,
    }))
}

/// `GET /admin/licenses/{license_key}`
pub async fn get_license_handler(
    State(state): State<AppState>,
    _session: AdminSession,
    Path(license_key): Path<String>,
) -> Result<Json<LicenseDetailResponse>, ApiError> {
    let license = state
        .db
        .get_license(&license_key)
        .await?
        .ok_or_else(ApiError::license_not_found)?;

    let activations = state.db.activations_for_license(&license_key).await?;

    Ok(Json(LicenseDetailResponse {
        license,
        activations,
    }))
}

/// `DELETE /admin/licenses/{license_key}`
pub async fn delete_license_handler(
    State(state): State<AppState>,
    session: AdminSession,
    Path(license_key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.db.delete_license(&license_key).await? {
        return Err(ApiError::license_not_found());
    }

    log_license_event(
        LicenseEvent::Deleted,
        &license_key,
        Some(&format!("by {}", session.username)),
    );
    state.remote.delete_license(&license_key).await;

    Ok(MessageResponse::ok("License deleted successfully"))
}

/// `POST /admin/block`
pub async fn block_license_handler(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<BlockRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = normalize_optional(payload.message)
        .unwrap_or_else(|| DEFAULT_BLOCK_MESSAGE.to_string());

    if !state
        .db
        .set_blocked(&payload.license_key, true, Some(&message))
        .await?
    {
        return Err(ApiError::license_not_found());
    }

    log_license_event(
        LicenseEvent::Blocked,
        &payload.license_key,
        Some(&format!("by {}: {message}", session.username)),
    );

    Ok(MessageResponse::ok("License blocked"))
}

/// `POST /admin/unblock?license_key=`
pub async fn unblock_license_handler(
    State(state): State<AppState>,
    session: AdminSession,
    Query(query): Query<UnblockQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.db.set_blocked(&query.license_key, false, None).await? {
        return Err(ApiError::license_not_found());
    }

    log_license_event(
        LicenseEvent::Unblocked,
        &query.license_key,
        Some(&format!("by {}", session.username)),
    );

    Ok(MessageResponse::ok("License unblocked"))
}

/// `POST /admin/extend`
pub async fn extend_license_handler(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<ExtendRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let new_expiry = parse_datetime(&payload.new_expiry, "new_expiry")?;

    if !state
        .db
        .update_expiry(&payload.license_key, new_expiry)
        .await?
    {
        return Err(ApiError::license_not_found());
    }

    log_license_event(
        LicenseEvent::Extended,
        &payload.license_key,
        Some(&format!("by {} to {new_expiry}", session.username)),
    );
    state
        .remote
        .patch_expiry(&payload.license_key, new_expiry)
        .await;

    Ok(MessageResponse::ok("License expiry extended"))
}

/// `GET /admin/activations`
pub async fn list_activations_handler(
    State(state): State<AppState>,
    _session: AdminSession,
) -> Result<Json<ActivationListResponse>, ApiError> {
    let activations = state.db.list_activations(ACTIVATION_LIST_LIMIT).await?;
    Ok(Json(ActivationListResponse { activations }))
}

/// `DELETE /admin/activation/{id}`
pub async fn deactivate_activation_handler(
    State(state): State<AppState>,
    session: AdminSession,
    Path(activation_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.db.deactivate_activation(activation_id).await? {
        return Err(ApiError::not_found("Activation"));
    }

    log_license_event(
        LicenseEvent::Deactivated,
        &format!("activation:{activation_id}"),
        Some(&format!("by {}", session.username)),
    );

    Ok(MessageResponse::ok("Device deactivated"))
}
