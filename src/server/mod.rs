// src/server/mod.rs

//! Server-side components of licensehub.
//!
//! This module contains:
//! - `database`    → DB abstraction over SQLite/Postgres
//! - `handlers`    → Shared state plus the health and info endpoints
//! - `admin`       → Admin API (login, license CRUD, activations, stats)
//! - `client_api`  → Activation and validation for client applications
//! - `auth`        → Bearer-session extractor for the admin API
//! - `remote`      → Client for the remote license registry
//! - `routes`      → Router builder
//! - `logging`     → Request logging middleware and license events
//! - `validation`  → Request validation utilities

pub mod admin;
pub mod api_error;
pub mod auth;
pub mod client_api;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod remote;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ErrorCode};
pub use auth::{AdminSession, SessionStore};
pub use database::Database;
pub use handlers::AppState;
pub use remote::RemoteRegistry;
pub use routes::build_router;
