//! Admin session token storage and the session guard.
//!
//! The dashboard keeps exactly one piece of client state: the bearer token
//! returned by `POST /admin/login`, stored under the fixed key `admin_token`.
//!
//! ## Storage Locations
//!
//! **Keyring (Primary):**
//! - Service: `licensehub`
//! - Key: `admin_token`
//!
//! **File Fallback (Secondary):**
//! - Windows: `%APPDATA%\licensehub\admin_token`
//! - macOS: `~/Library/Application Support/licensehub/admin_token`
//! - Linux: `~/.local/share/licensehub/admin_token`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;

use crate::dashboard::errors::{DashboardError, DashboardResult};

/// Service name for keyring storage.
const KEYRING_SERVICE: &str = "licensehub";

/// Fixed storage key for the admin bearer token.
pub const TOKEN_KEY: &str = "admin_token";

/// Get the application data directory for licensehub.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("licensehub"))
}

/// Where the admin token lives.
#[derive(Debug, Clone)]
pub enum TokenStore {
    /// OS keyring, falling back to a file in `dir`.
    Secure { dir: PathBuf },
    /// Plain file in `dir`, no keyring.
    File { dir: PathBuf },
    /// Process memory only.
    Memory(Arc<Mutex<Option<String>>>),
}

impl TokenStore {
    /// Keyring-backed store with the platform data directory as fallback.
    pub fn secure() -> DashboardResult<Self> {
        let dir = default_data_dir().ok_or_else(|| {
            DashboardError::Storage("could not determine app data directory".to_string())
        })?;
        Ok(TokenStore::Secure { dir })
    }

    pub fn file(dir: impl Into<PathBuf>) -> Self {
        TokenStore::File { dir: dir.into() }
    }

    pub fn memory() -> Self {
        TokenStore::Memory(Arc::new(Mutex::new(None)))
    }

    /// Store a token, replacing any previous one.
    ///
    /// The keyring is tried first and read back to verify the write; on any
    /// keyring failure the token goes to the fallback file.
    pub async fn save(&self, token: &str) -> DashboardResult<()> {
        match self {
            TokenStore::Secure { dir } => {
                match save_to_keyring(token) {
                    Ok(()) => {
                        if load_from_keyring().ok().as_deref() == Some(token) {
                            log::debug!("Saved {} to keyring", TOKEN_KEY);
                            return Ok(());
                        }
                        log::debug!(
                            "Keyring save verification failed for {}, falling back to file",
                            TOKEN_KEY
                        );
                    }
                    Err(e) => {
                        log::debug!(
                            "Keyring save failed for {}: {}, falling back to file",
                            TOKEN_KEY,
                            e
                        );
                    }
                }
                save_to_file(dir, token).await?;
                log::debug!("Saved {} to app data directory", TOKEN_KEY);
                Ok(())
            }
            TokenStore::File { dir } => save_to_file(dir, token).await,
            TokenStore::Memory(slot) => {
                *lock(slot)? = Some(token.to_string());
                Ok(())
            }
        }
    }

    /// Load the stored token, if any.
    pub async fn load(&self) -> DashboardResult<Option<String>> {
        match self {
            TokenStore::Secure { dir } => {
                match load_from_keyring() {
                    Ok(token) => {
                        log::debug!("Loaded {} from keyring", TOKEN_KEY);
                        return Ok(non_empty(token));
                    }
                    Err(e) => log::debug!("Keyring load failed for {}: {}", TOKEN_KEY, e),
                }
                load_from_file(dir).await
            }
            TokenStore::File { dir } => load_from_file(dir).await,
            TokenStore::Memory(slot) => Ok(lock(slot)?.clone()),
        }
    }

    /// Remove the token from every location. Missing entries are not errors.
    pub async fn clear(&self) -> DashboardResult<()> {
        match self {
            TokenStore::Secure { dir } => {
                match clear_from_keyring() {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(e) => log::debug!("Keyring clear failed for {}: {}", TOKEN_KEY, e),
                }
                clear_file(dir).await
            }
            TokenStore::File { dir } => clear_file(dir).await,
            TokenStore::Memory(slot) => {
                *lock(slot)? = None;
                Ok(())
            }
        }
    }
}

fn lock(
    slot: &Mutex<Option<String>>,
) -> DashboardResult<std::sync::MutexGuard<'_, Option<String>>> {
    slot.lock()
        .map_err(|_| DashboardError::Storage("token store lock poisoned".to_string()))
}

fn non_empty(token: String) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

// === Keyring Operations ===

fn save_to_keyring(token: &str) -> Result<(), keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, TOKEN_KEY)?.set_password(token)
}

fn load_from_keyring() -> Result<String, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, TOKEN_KEY)?.get_password()
}

fn clear_from_keyring() -> Result<(), keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, TOKEN_KEY)?.delete_credential()
}

// === File Operations ===

async fn save_to_file(dir: &Path, token: &str) -> DashboardResult<()> {
    fs::create_dir_all(dir).await?;
    fs::write(dir.join(TOKEN_KEY), token).await?;
    Ok(())
}

async fn load_from_file(dir: &Path) -> DashboardResult<Option<String>> {
    match fs::read_to_string(dir.join(TOKEN_KEY)).await {
        Ok(data) => Ok(non_empty(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn clear_file(dir: &Path) -> DashboardResult<()> {
    match fs::remove_file(dir.join(TOKEN_KEY)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Which top-level view a session may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Shell,
}

/// Decides between the login view and the dashboard shell.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    store: TokenStore,
}

impl SessionGuard {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// `Shell` when a token is stored, otherwise `Login`.
    ///
    /// Only presence is checked. A stale token is discovered by the first
    /// request that the server rejects.
    pub async fn resolve(&self) -> DashboardResult<View> {
        Ok(match self.store.load().await? {
            Some(_) => View::Shell,
            None => View::Login,
        })
    }

    /// Store the token from a successful login.
    pub async fn on_login(&self, token: &str) -> DashboardResult<()> {
        self.store.save(token).await
    }

    /// Forget the stored token.
    pub async fn on_logout(&self) -> DashboardResult<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_resolves_to_login_without_token() {
        let guard = SessionGuard::new(TokenStore::memory());
        assert_eq!(guard.resolve().await.unwrap(), View::Login);
    }

    #[tokio::test]
    async fn login_then_logout_switches_views() {
        let guard = SessionGuard::new(TokenStore::memory());

        guard.on_login("tok-123").await.unwrap();
        assert_eq!(guard.resolve().await.unwrap(), View::Shell);
        assert_eq!(
            guard.store().load().await.unwrap().as_deref(),
            Some("tok-123")
        );

        guard.on_logout().await.unwrap();
        assert_eq!(guard.resolve().await.unwrap(), View::Login);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::file(dir.path().join("nested"));

        assert!(store.load().await.unwrap().is_none());
        store.save("abc").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("abc"));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn blank_token_file_counts_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_KEY), "  \n").unwrap();

        let guard = SessionGuard::new(TokenStore::file(dir.path()));
        assert_eq!(guard.resolve().await.unwrap(), View::Login);
    }
}
