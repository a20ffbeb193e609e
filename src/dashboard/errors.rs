//! Error types for the admin dashboard.
//!
//! Every failure is reported to the operator as "request failed" followed by
//! the most specific message available: the server's `detail` when the
//! response carried one, otherwise the transport or storage error.

use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the license server: `{"detail": ..., "code": ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Error)]
pub enum DashboardError {
    /// Server answered with a non-success status.
    #[error("request failed: {}", api_message(.status, .detail))]
    Api { status: u16, detail: Option<String> },

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request failed: token storage: {0}")]
    Storage(String),

    #[error("request failed: not logged in (run `licensehub_admin login` first)")]
    NotLoggedIn,

    /// A command ran but the server refused it.
    #[error("{0}")]
    ActionFailed(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("configuration error: {0}")]
    Config(String),
}

fn api_message(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("HTTP {status}"),
    }
}

impl DashboardError {
    /// Server `detail`, when the failure came with one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            DashboardError::Api { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of an API failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            DashboardError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        DashboardError::Storage(err.to_string())
    }
}

impl From<keyring::Error> for DashboardError {
    fn from(err: keyring::Error) -> Self {
        DashboardError::Storage(err.to_string())
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
