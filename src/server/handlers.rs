use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::license_key::LicenseKeyConfig;
use crate::server::api_error::ApiError;
use crate::server::auth::SessionStore;
use crate::server::database::Database;
use crate::server::logging::HealthResponse;
use crate::server::remote::RemoteRegistry;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: Arc<SessionStore>,
    pub remote: Arc<RemoteRegistry>,
    pub license_keys: LicenseKeyConfig,
}

impl AppState {
    pub fn new(db: Arc<Database>, remote: RemoteRegistry, license_keys: LicenseKeyConfig) -> Self {
        Self {
            db,
            sessions: Arc::new(SessionStore::new()),
            remote: Arc::new(remote),
            license_keys,
        }
    }

    /// State with the remote registry switched off and default key settings.
    pub fn offline(db: Arc<Database>) -> Self {
        Self::new(db, RemoteRegistry::disabled(), LicenseKeyConfig::default())
    }
}

/// Public, display-only information about a license.
#[derive(Debug, Serialize, Deserialize)]
pub struct LicenseInfoResponse {
    pub customer_name: String,
    pub company_name: Option<String>,
    pub expires_at: NaiveDateTime,
    pub is_blocked: bool,
}

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// `GET /info/:license_key`
pub async fn license_info_handler(
    State(state): State<AppState>,
    Path(license_key): Path<String>,
) -> Result<Json<LicenseInfoResponse>, ApiError> {
    let license = state
        .db
        .get_license(&license_key)
        .await?
        .ok_or_else(ApiError::license_not_found)?;

    Ok(Json(LicenseInfoResponse {
        customer_name: license.customer_name,
        company_name: license.company_name,
        expires_at: license.expires_at,
        is_blocked: license.is_blocked,
    }))
}
