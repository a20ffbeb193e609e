//! Client for the remote license registry.
//!
//! The registry mirrors every license issued by this server. It is used in
//! four ways:
//! - **push**: new and existing licenses are posted to `/m4st3r/license/sync`
//! - **fetch**: unknown keys are looked up at `/sys/license/{key}` and imported
//! - **override**: `/sys/validate` may disable a key regardless of local state
//! - **propagate**: expiry changes and deletions are mirrored to
//!   `/m4st3r/central/licenses/{key}`
//!
//! Every call except push is best effort. Fetch and override never surface
//! errors to the caller: a failed override check allows the license.

use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::server::database::{License, NewLicense};
use crate::server::validation::parse_datetime;

/// Wire format for the ISO timestamps exchanged with the registry.
const REMOTE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn format_remote_datetime(dt: NaiveDateTime) -> String {
    dt.format(REMOTE_DATETIME_FORMAT).to_string()
}

/// A license as the registry stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLicense {
    pub license_key: String,
    pub customer_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub expires_at: String,
    #[serde(default = "default_max_activations")]
    pub max_activations: i64,
    #[serde(default)]
    pub restricted_fingerprint: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_message: Option<String>,
}

fn default_max_activations() -> i64 {
    1
}

impl From<&License> for RemoteLicense {
    fn from(license: &License) -> Self {
        Self {
            license_key: license.license_key.clone(),
            customer_name: license.customer_name.clone(),
            company_name: license.company_name.clone(),
            email: license.email.clone(),
            phone: license.phone.clone(),
            expires_at: format_remote_datetime(license.expires_at),
            max_activations: license.max_activations,
            restricted_fingerprint: license.restricted_fingerprint.clone(),
            notes: license.notes.clone(),
            created_by: license.created_by.clone(),
            generated_at: Some(format_remote_datetime(license.generated_at)),
            updated_at: license.updated_at.map(format_remote_datetime),
            is_blocked: license.is_blocked,
            block_message: license.block_message.clone(),
        }
    }
}

impl RemoteLicense {
    /// Convert into a row for local import.
    ///
    /// Missing provenance defaults to `system_sync` and the current time.
    pub fn to_new_license(&self) -> LicenseResult<NewLicense> {
        let expires_at = parse_datetime(&self.expires_at, "expires_at")
            .map_err(|e| LicenseError::InvalidLicense(e.to_string()))?;

        let generated_at = self
            .generated_at
            .as_deref()
            .and_then(|raw| parse_datetime(raw, "generated_at").ok())
            .unwrap_or_else(|| Utc::now().naive_utc());

        Ok(NewLicense {
            license_key: self.license_key.clone(),
            customer_name: self.customer_name.clone(),
            company_name: self.company_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            expires_at,
            max_activations: self.max_activations,
            restricted_fingerprint: self.restricted_fingerprint.clone(),
            notes: self.notes.clone(),
            created_by: Some(
                self.created_by
                    .clone()
                    .unwrap_or_else(|| "system_sync".to_string()),
            ),
            generated_at,
        })
    }
}

/// Answer of the registry's override check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOverride {
    #[serde(default = "default_allowed")]
    pub allowed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_allowed() -> bool {
    true
}

impl RemoteOverride {
    /// The fail-open answer.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }
}

/// Result of pushing a batch of licenses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub pushed: usize,
    pub failed: usize,
}

impl PushSummary {
    pub fn attempted(&self) -> usize {
        self.pushed + self.failed
    }
}

/// HTTP client for the remote registry.
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    http: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteRegistry {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// A registry that never makes a network call.
    pub fn disabled() -> Self {
        Self::new(RemoteConfig::default())
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Whether pushes (and propagated writes) are attempted.
    pub fn sync_enabled(&self) -> bool {
        self.config.sync_enabled()
    }

    /// Registry URL with each of `segments` appended as one encoded path segment.
    fn endpoint(&self, segments: &[&str]) -> LicenseResult<reqwest::Url> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(LicenseError::InvalidLicense(format!(
                "unusable registry path segment {bad:?}"
            )));
        }

        let mut url = reqwest::Url::parse(&self.config.url)
            .map_err(|e| LicenseError::ConfigError(format!("remote.url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| LicenseError::ConfigError("remote.url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    /// Push one license.
    ///
    /// Returns `Ok(false)` when sync is disabled or the registry answered
    /// with a non-200 status.
    pub async fn push_license(&self, license: &RemoteLicense) -> LicenseResult<bool> {
        if !self.sync_enabled() {
            debug!(license_key = %license.license_key, "Skipping remote push: sync not configured");
            return Ok(false);
        }

        let response = self
            .http
            .post(self.endpoint(&["m4st3r", "license", "sync"])?)
            .bearer_auth(&self.config.admin_token)
            .timeout(self.request_timeout())
            .json(license)
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            info!(license_key = %license.license_key, "License synced to remote registry");
            Ok(true)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                license_key = %license.license_key,
                status = %status.as_u16(),
                "Remote sync rejected: {body}"
            );
            Ok(false)
        }
    }

    /// Push every license, counting successes.
    pub async fn push_all(&self, licenses: &[License]) -> PushSummary {
        let mut summary = PushSummary::default();

        for license in licenses {
            match self.push_license(&RemoteLicense::from(license)).await {
                Ok(true) => summary.pushed += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    warn!(license_key = %license.license_key, "Failed to push license: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Look a key up in the registry. Any failure yields `None`.
    pub async fn fetch_license(&self, license_key: &str) -> Option<RemoteLicense> {
        if !self.config.is_configured() {
            return None;
        }

        let url = match self.endpoint(&["sys", "license", license_key]) {
            Ok(url) => url,
            Err(e) => {
                warn!(license_key = %license_key, "Remote fetch skipped: {e}");
                return None;
            }
        };

        info!(license_key = %license_key, "Searching remote registry for license");
        let result = self
            .http
            .get(url)
            .timeout(self.request_timeout())
            .send()
            .await;

        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                match response.json::<RemoteLicense>().await {
                    Ok(license) => Some(license),
                    Err(e) => {
                        warn!(license_key = %license_key, "Remote license payload unreadable: {e}");
                        None
                    }
                }
            }
            Ok(response) => {
                debug!(
                    license_key = %license_key,
                    status = %response.status().as_u16(),
                    "License not found remotely"
                );
                None
            }
            Err(e) => {
                warn!(license_key = %license_key, "Remote fetch error: {e}");
                None
            }
        }
    }

    /// Ask the registry whether a key is still allowed.
    ///
    /// Unreachable registries and unreadable answers allow the key.
    pub async fn check_override(&self, license_key: &str) -> RemoteOverride {
        if !self.config.is_configured() {
            return RemoteOverride::allow();
        }

        let url = match self.endpoint(&["sys", "validate"]) {
            Ok(url) => url,
            Err(e) => {
                warn!(license_key = %license_key, "Remote check skipped: {e}");
                return RemoteOverride::allow();
            }
        };

        let result = self
            .http
            .post(url)
            .query(&[("license_key", license_key)])
            .timeout(Duration::from_secs(self.config.override_timeout_secs))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(license_key = %license_key, "Remote check failed: {e}");
                return RemoteOverride::allow();
            }
        };

        match response.json::<RemoteOverride>().await {
            Ok(answer) => {
                debug!(license_key = %license_key, allowed = answer.allowed, "Remote validation answer");
                answer
            }
            Err(e) => {
                warn!(license_key = %license_key, "Remote check unreadable: {e}");
                RemoteOverride::allow()
            }
        }
    }

    /// Mirror a new expiry. Returns whether the registry accepted it;
    /// failures are logged only.
    pub async fn patch_expiry(&self, license_key: &str, expires_at: NaiveDateTime) -> bool {
        if !self.sync_enabled() {
            return false;
        }

        let url = match self.endpoint(&["m4st3r", "central", "licenses", license_key]) {
            Ok(url) => url,
            Err(e) => {
                warn!(license_key = %license_key, "Expiry sync skipped: {e}");
                return false;
            }
        };

        let body = serde_json::json!({ "expires_at": format_remote_datetime(expires_at) });
        let result = self
            .http
            .patch(url)
            .bearer_auth(&self.config.admin_token)
            .timeout(self.request_timeout())
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(license_key = %license_key, "License expiry synced remotely");
                true
            }
            Ok(response) => {
                warn!(
                    license_key = %license_key,
                    status = %response.status().as_u16(),
                    "Remote registry rejected expiry sync"
                );
                false
            }
            Err(e) => {
                warn!(license_key = %license_key, "Failed to sync expiry remotely: {e}");
                false
            }
        }
    }

    /// Mirror a deletion. Returns whether the registry accepted it;
    /// failures are logged only.
    pub async fn delete_license(&self, license_key: &str) -> bool {
        if !self.sync_enabled() {
            return false;
        }

        let url = match self.endpoint(&["m4st3r", "central", "licenses", license_key]) {
            Ok(url) => url,
            Err(e) => {
                warn!(license_key = %license_key, "Deletion sync skipped: {e}");
                return false;
            }
        };

        let result = self
            .http
            .delete(url)
            .bearer_auth(&self.config.admin_token)
            .timeout(self.request_timeout())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(license_key = %license_key, "License deletion synced remotely");
                true
            }
            Ok(response) => {
                warn!(
                    license_key = %license_key,
                    status = %response.status().as_u16(),
                    "Remote registry rejected deletion sync"
                );
                false
            }
            Err(e) => {
                warn!(license_key = %license_key, "Failed to sync deletion remotely: {e}");
                false
            }
        }
    }
}
