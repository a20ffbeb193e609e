//! Development proxy.
//!
//! Listens locally and forwards the API path prefixes to the license server,
//! so a dashboard served from the proxy origin can call the API without
//! cross-origin setup. Anything outside those prefixes gets `404`.

use std::net::SocketAddr;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::dashboard::errors::{DashboardError, DashboardResult};

/// Path prefixes forwarded to the backend.
pub const PROXIED_PREFIXES: [&str; 4] = ["/admin", "/activate", "/validate", "/health"];

/// Largest request body the proxy buffers.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers that describe a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::HOST,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_LENGTH,
];

/// Whether `path` falls under one of the forwarded prefixes.
///
/// Matching is per path segment: `/admin` and `/admin/stats` match,
/// `/administrator` does not.
pub fn is_proxied(path: &str) -> bool {
    PROXIED_PREFIXES.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

#[derive(Debug, Clone)]
pub struct DevProxy {
    client: reqwest::Client,
    origin: String,
}

impl DevProxy {
    pub fn new(backend_origin: &str) -> DashboardResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            origin: backend_origin.trim_end_matches('/').to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Upstream URL for a request path and query.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.origin, path_and_query)
    }

    async fn forward(&self, request: Request) -> DashboardResult<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = self.target_url(path_and_query);

        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| DashboardError::Proxy(format!("reading request body: {e}")))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        debug!("Proxying {} {}", parts.method, url);
        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut upstream_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut upstream_headers);
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = upstream_headers;
        Ok(response)
    }
}

async fn proxy_handler(State(proxy): State<DevProxy>, request: Request) -> Response {
    if !is_proxied(request.uri().path()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    match proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Proxy request to {} failed: {}", proxy.origin(), e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Router that forwards every proxied path.
pub fn router(proxy: DevProxy) -> Router {
    Router::new().fallback(proxy_handler).with_state(proxy)
}

/// Bind to localhost on the configured port and forward until stopped.
pub async fn serve(config: &ProxyConfig) -> DashboardResult<()> {
    let proxy = DevProxy::new(&config.backend_origin)?;
    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DashboardError::Proxy(format!("failed to bind {addr}: {e}")))?;

    info!(
        "Dev proxy listening on http://{} -> {} ({})",
        addr,
        proxy.origin(),
        PROXIED_PREFIXES.join(", ")
    );

    axum::serve(listener, router(proxy))
        .await
        .map_err(|e| DashboardError::Proxy(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_match_by_segment() {
        assert!(is_proxied("/admin"));
        assert!(is_proxied("/admin/licenses/WB-1"));
        assert!(is_proxied("/activate"));
        assert!(is_proxied("/validate"));
        assert!(is_proxied("/health"));
        assert!(!is_proxied("/administrator"));
        assert!(!is_proxied("/info/WB-1"));
        assert!(!is_proxied("/"));
    }

    #[test]
    fn target_url_keeps_query() {
        let proxy = DevProxy::new("http://localhost:8001/").unwrap();
        assert_eq!(
            proxy.target_url("/admin/unblock?license_key=WB-1"),
            "http://localhost:8001/admin/unblock?license_key=WB-1"
        );
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "localhost:3000".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer t".parse().unwrap());
        strip_hop_by_hop(&mut headers);
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::AUTHORIZATION).is_some());
    }
}
