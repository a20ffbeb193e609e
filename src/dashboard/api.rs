//! Typed HTTP client for the license server's admin API.
//!
//! Every authenticated call reads the token from the [`TokenStore`] right
//! before sending, so a login or logout in another process takes effect on
//! the next request.

use std::time::Duration;

use chrono::NaiveDateTime;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dashboard::errors::{DashboardError, DashboardResult, ErrorBody};
use crate::dashboard::session::TokenStore;

/// Block message sent when the operator gives none.
pub const DEFAULT_BLOCK_MESSAGE: &str = "License blocked by administrator";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregate counters from `GET /admin/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Stats {
    pub total_licenses: i64,
    pub active_licenses: i64,
    pub expired_licenses: i64,
    pub blocked_licenses: i64,
    pub total_activations: i64,
}

/// A license row as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct LicenseRecord {
    #[serde(default)]
    pub id: i64,
    pub license_key: String,
    pub customer_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub expires_at: NaiveDateTime,
    pub max_activations: i64,
    #[serde(default)]
    pub activation_count: i64,
    #[serde(default)]
    pub is_blocked: bool,
}

/// A device activation as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivationRecord {
    pub id: i64,
    pub license_key: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    pub hardware_fingerprint: String,
    pub activated_at: NaiveDateTime,
    #[serde(default)]
    pub last_validated: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_active: bool,
}

/// Fields of the generate-license form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateForm {
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub expires_at: String,
    pub max_activations: i64,
    pub restricted_fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for GenerateForm {
    fn default() -> Self {
        Self {
            customer_name: String::new(),
            company_name: None,
            email: None,
            phone: None,
            expires_at: String::new(),
            max_activations: 1,
            restricted_fingerprint: String::new(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResult {
    pub license_key: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    pub token: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Deserialize)]
struct LicenseList {
    licenses: Vec<LicenseRecord>,
}

#[derive(Deserialize)]
struct ActivationList {
    activations: Vec<ActivationRecord>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct BlockBody<'a> {
    license_key: &'a str,
    message: &'a str,
}

/// Admin API client.
#[derive(Debug, Clone)]
pub struct AdminApi {
    http: Client,
    base_url: String,
    store: TokenStore,
}

impl AdminApi {
    pub fn new(base_url: impl Into<String>, store: TokenStore) -> DashboardResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn token(&self) -> DashboardResult<String> {
        self.store.load().await?.ok_or(DashboardError::NotLoggedIn)
    }

    async fn authed(&self, method: reqwest::Method, path: &str) -> DashboardResult<RequestBuilder> {
        let token = self.token().await?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> DashboardResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail);
            return Err(DashboardError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// `POST /admin/login`. Stores the returned token on success.
    pub async fn login(&self, username: &str, password: &str) -> DashboardResult<LoginResult> {
        let request = self
            .http
            .post(self.url("/admin/login"))
            .json(&Credentials { username, password });
        let result: LoginResult = Self::send(request).await?;
        self.store.save(&result.token).await?;
        Ok(result)
    }

    /// Revoke the session on the server and forget the local token.
    ///
    /// The local token is cleared even when the server call fails.
    pub async fn logout(&self) -> DashboardResult<()> {
        if let Ok(request) = self.authed(reqwest::Method::POST, "/admin/logout").await {
            if let Err(e) = Self::send::<MessageResult>(request).await {
                log::debug!("Server logout failed: {}", e);
            }
        }
        self.store.clear().await
    }

    /// `GET /admin/stats`
    pub async fn stats(&self) -> DashboardResult<Stats> {
        Self::send(self.authed(reqwest::Method::GET, "/admin/stats").await?).await
    }

    /// `GET /admin/licenses`
    pub async fn licenses(&self) -> DashboardResult<Vec<LicenseRecord>> {
        let list: LicenseList =
            Self::send(self.authed(reqwest::Method::GET, "/admin/licenses").await?).await?;
        Ok(list.licenses)
    }

    /// `DELETE /admin/licenses/{key}`
    pub async fn delete_license(&self, license_key: &str) -> DashboardResult<MessageResult> {
        if matches!(license_key, "" | "." | "..") {
            return Err(DashboardError::ActionFailed(format!(
                "Invalid license key {license_key:?}"
            )));
        }

        let mut url = reqwest::Url::parse(&self.url("/admin/licenses"))
            .map_err(|e| DashboardError::Config(format!("api url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| DashboardError::Config("api url cannot take a path".to_string()))?
            .push(license_key);

        let token = self.token().await?;
        Self::send(self.http.delete(url).bearer_auth(token)).await
    }

    /// `POST /admin/generate`
    pub async fn generate(&self, form: &GenerateForm) -> DashboardResult<GenerateResult> {
        let request = self
            .authed(reqwest::Method::POST, "/admin/generate")
            .await?
            .json(form);
        Self::send(request).await
    }

    /// `POST /admin/block`
    pub async fn block(
        &self,
        license_key: &str,
        message: Option<&str>,
    ) -> DashboardResult<MessageResult> {
        let body = BlockBody {
            license_key,
            message: message.unwrap_or(DEFAULT_BLOCK_MESSAGE),
        };
        let request = self
            .authed(reqwest::Method::POST, "/admin/block")
            .await?
            .json(&body);
        Self::send(request).await
    }

    /// `POST /admin/unblock?license_key=`
    pub async fn unblock(&self, license_key: &str) -> DashboardResult<MessageResult> {
        let request = self
            .authed(reqwest::Method::POST, "/admin/unblock")
            .await?
            .query(&[("license_key", license_key)]);
        Self::send(request).await
    }

    /// `GET /admin/activations`
    pub async fn activations(&self) -> DashboardResult<Vec<ActivationRecord>> {
        let list: ActivationList =
            Self::send(self.authed(reqwest::Method::GET, "/admin/activations").await?).await?;
        Ok(list.activations)
    }

    /// `DELETE /admin/activation/{id}`
    pub async fn deactivate(&self, activation_id: i64) -> DashboardResult<MessageResult> {
        let path = format!("/admin/activation/{activation_id}");
        Self::send(self.authed(reqwest::Method::DELETE, &path).await?).await
    }
}
