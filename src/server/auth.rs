//! Bearer-session authentication for the admin API.
//!
//! A successful `POST /admin/login` mints a random URL-safe token and maps
//! it to the admin's username in an in-memory [`SessionStore`]. Every other
//! `/admin/*` handler takes an [`AdminSession`] extractor, which rejects
//! requests without a live `Authorization: Bearer <token>` header.
//!
//! Sessions expire [`SESSION_TTL`] after login, at most [`MAX_SESSIONS`] are
//! kept (oldest evicted first), and none survive a server restart.
//!
//! ```rust,ignore
//! async fn stats_handler(session: AdminSession) -> impl IntoResponse {
//!     format!("Hello, {}!", session.username)
//! }
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::handlers::AppState;

/// Prefix stored in front of the hex digest in `admin_users.password_hash`.
pub const PASSWORD_HASH_PREFIX: &str = "SHA2:";

/// Random bytes behind each session token.
const TOKEN_BYTES: usize = 32;

/// Lifetime of an admin session.
pub const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Live sessions kept before the oldest is evicted.
pub const MAX_SESSIONS: usize = 1024;

/// Hash a password into the stored `SHA2:<hex>` form.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    format!("{PASSWORD_HASH_PREFIX}{}", hex::encode(digest))
}

/// Compare a candidate password against a stored hash.
///
/// Surrounding whitespace in the stored value is ignored.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    hash_password(password) == stored_hash.trim()
}

/// Mint a fresh session token.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug)]
struct Session {
    username: String,
    issued_at: Instant,
}

/// Live admin sessions, keyed by token.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(SESSION_TTL, MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Open a session for `username` and return its token.
    ///
    /// Expired sessions are pruned first; at capacity the oldest is dropped.
    pub async fn create(&self, username: &str) -> String {
        let token = generate_session_token();
        let mut sessions = self.sessions.write().await;

        sessions.retain(|_, session| session.issued_at.elapsed() < self.ttl);
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, session)| session.issued_at)
                .map(|(token, _)| token.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
        }

        sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Username owning `token`, if the session is live. Expired sessions
    /// are removed on sight.
    pub async fn lookup(&self, token: &str) -> Option<String> {
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(token)?;
            if session.issued_at.elapsed() < self.ttl {
                return Some(session.username.clone());
            }
        }

        self.sessions.write().await.remove(token);
        None
    }

    /// Drop a session. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

/// Authentication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or non-Bearer Authorization header
    NotAuthenticated,
    /// Bearer token is not a live session
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAuthenticated => ApiError::new(ErrorCode::NotAuthenticated),
            AuthError::InvalidToken => ApiError::new(ErrorCode::InvalidToken),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::NotAuthenticated)
}

/// An authenticated admin, extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub username: String,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|value| value.to_str().ok());

        let token = bearer_token(header)?;

        let username = state
            .sessions
            .lookup(token)
            .await
            .ok_or(AuthError::InvalidToken)?;

        Ok(AdminSession {
            username,
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_format() {
        assert_eq!(
            hash_password("admin123"),
            "SHA2:240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9"
        );
        assert!(verify_password(
            "admin123",
            " SHA2:240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9\n"
        ));
        assert!(!verify_password("admin124", &hash_password("admin123")));
    }

    #[test]
    fn session_tokens_are_url_safe() {
        let token = generate_session_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_session_token());
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(AuthError::NotAuthenticated));
        assert_eq!(
            bearer_token(Some("Basic abc")),
            Err(AuthError::NotAuthenticated)
        );
        assert_eq!(bearer_token(Some("Bearer ")), Err(AuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn session_store_roundtrip() {
        let store = SessionStore::new();
        let token = store.create("admin").await;

        assert_eq!(store.lookup(&token).await.as_deref(), Some("admin"));
        assert!(store.revoke(&token).await);
        assert!(store.lookup(&token).await.is_none());
        assert!(!store.revoke(&token).await);
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected() {
        let store = SessionStore::with_limits(Duration::ZERO, MAX_SESSIONS);
        let token = store.create("admin").await;

        assert!(store.lookup(&token).await.is_none());
        assert!(!store.revoke(&token).await);
    }

    #[tokio::test]
    async fn oldest_session_is_evicted_at_capacity() {
        let store = SessionStore::with_limits(SESSION_TTL, 2);
        let first = store.create("admin").await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = store.create("admin").await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let third = store.create("ops").await;

        assert!(store.lookup(&first).await.is_none());
        assert_eq!(store.lookup(&second).await.as_deref(), Some("admin"));
        assert_eq!(store.lookup(&third).await.as_deref(), Some("ops"));
    }
}
