//! Request logging middleware and structured license events.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use licensehub::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License was generated by an admin
    Generated,
    /// License was imported from the remote registry
    Imported,
    /// License was activated on a device
    Activated,
    /// License was validated successfully
    Validated,
    /// Activation or validation was refused
    ValidationFailed,
    /// License was blocked
    Blocked,
    /// License was unblocked
    Unblocked,
    /// License expiry was moved
    Extended,
    /// License and its activations were deleted
    Deleted,
    /// A device activation was deactivated
    Deactivated,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Generated => "generated",
            LicenseEvent::Imported => "imported",
            LicenseEvent::Activated => "activated",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::Blocked => "blocked",
            LicenseEvent::Unblocked => "unblocked",
            LicenseEvent::Extended => "extended",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::Deactivated => "deactivated",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// Refusals are logged at `warn`, everything else at `info`.
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match event {
        LicenseEvent::ValidationFailed => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Tag every request with an ID, time it and log its outcome.
///
/// The ID is echoed back in the `X-Request-Id` response header.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Deployment layer this server runs in
    pub layer: String,
    /// Service name
    pub service: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            layer: "1".to_string(),
            service: "license-server".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn health_response_shape() {
        let json = serde_json::to_value(HealthResponse::healthy()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "healthy", "layer": "1", "service": "license-server"})
        );
    }

    #[test]
    fn event_names() {
        assert_eq!(LicenseEvent::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(LicenseEvent::Generated.to_string(), "generated");
    }
}
