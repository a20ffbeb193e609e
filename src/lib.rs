//! licensehub - license server and admin dashboard
//!
//! # Features
//!
//! - `server` - License server (admin + client API, database). Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `dashboard` - Terminal admin dashboard and dev proxy. Enabled by default.
//! - `background-jobs` - Periodic full sync to the remote registry. Enabled by default.
//!
//! # Example
//!
//! ```toml
//! # Server with PostgreSQL, no dashboard
//! licensehub = { version = "0.1", default-features = false, features = ["server", "postgres"] }
//! ```

// Core modules (always available)
pub mod config;
pub mod errors;
pub mod license_key;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

#[cfg(feature = "server")]
pub mod jobs;

// Admin dashboard (requires "dashboard" feature)
#[cfg(feature = "dashboard")]
pub mod dashboard;

/// Install the `tracing` subscriber used by both binaries.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
