use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::{get_config, DatabaseConfig};
use crate::errors::{LicenseError, LicenseResult};

/// Username of the administrator seeded on first start.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// `SHA2:` hash of the seeded administrator's password (`admin123`).
pub const DEFAULT_ADMIN_PASSWORD_HASH: &str =
    "SHA2:240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9";

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS admin_users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        license_key TEXT NOT NULL UNIQUE,
        customer_name TEXT NOT NULL,
        company_name TEXT,
        email TEXT,
        phone TEXT,
        expires_at TIMESTAMP NOT NULL,
        max_activations INTEGER NOT NULL DEFAULT 1,
        restricted_fingerprint TEXT,
        notes TEXT,
        is_blocked BOOLEAN NOT NULL DEFAULT FALSE,
        block_message TEXT,
        created_by TEXT,
        generated_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        license_key TEXT NOT NULL,
        hardware_fingerprint TEXT NOT NULL,
        device_name TEXT,
        activated_at TIMESTAMP NOT NULL,
        last_validated TIMESTAMP,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_activations_license ON activations(license_key)",
    r#"
    UPDATE activations SET is_active = FALSE
    WHERE is_active = TRUE AND id NOT IN (
        SELECT MIN(id) FROM activations WHERE is_active = TRUE
        GROUP BY license_key, hardware_fingerprint
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_activations_active_device \
     ON activations(license_key, hardware_fingerprint) WHERE is_active = TRUE",
    r#"
    CREATE TABLE IF NOT EXISTS validation_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        license_key TEXT,
        hardware_fingerprint TEXT,
        status TEXT NOT NULL,
        remote_override BOOLEAN NOT NULL DEFAULT FALSE,
        message TEXT,
        validated_at TIMESTAMP NOT NULL
    )
    "#,
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS admin_users (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL UNIQUE,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id BIGSERIAL PRIMARY KEY,
        license_key VARCHAR(50) NOT NULL UNIQUE,
        customer_name VARCHAR(255) NOT NULL,
        company_name VARCHAR(255),
        email VARCHAR(255),
        phone VARCHAR(50),
        expires_at TIMESTAMP NOT NULL,
        max_activations BIGINT NOT NULL DEFAULT 1,
        restricted_fingerprint VARCHAR(255),
        notes TEXT,
        is_blocked BOOLEAN NOT NULL DEFAULT FALSE,
        block_message TEXT,
        created_by VARCHAR(50),
        generated_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activations (
        id BIGSERIAL PRIMARY KEY,
        license_key VARCHAR(50) NOT NULL,
        hardware_fingerprint VARCHAR(255) NOT NULL,
        device_name VARCHAR(255),
        activated_at TIMESTAMP NOT NULL,
        last_validated TIMESTAMP,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_activations_license ON activations(license_key)",
    r#"
    UPDATE activations SET is_active = FALSE
    WHERE is_active = TRUE AND id NOT IN (
        SELECT MIN(id) FROM activations WHERE is_active = TRUE
        GROUP BY license_key, hardware_fingerprint
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_activations_active_device \
     ON activations(license_key, hardware_fingerprint) WHERE is_active = TRUE",
    r#"
    CREATE TABLE IF NOT EXISTS validation_logs (
        id BIGSERIAL PRIMARY KEY,
        license_key VARCHAR(50),
        hardware_fingerprint VARCHAR(255),
        status VARCHAR(50) NOT NULL,
        remote_override BOOLEAN NOT NULL DEFAULT FALSE,
        message TEXT,
        validated_at TIMESTAMP NOT NULL
    )
    "#,
];

/// An administrator account.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// A license record stored in the `licenses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct License {
    pub id: i64,
    pub license_key: String,
    pub customer_name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub expires_at: NaiveDateTime,
    pub max_activations: i64,
    pub restricted_fingerprint: Option<String>,
    pub notes: Option<String>,
    pub is_blocked: bool,
    pub block_message: Option<String>,
    pub created_by: Option<String>,
    pub generated_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl License {
    /// Whether the license has passed its expiry at `now`.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at < now
    }
}

/// A license together with its number of active activations.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LicenseRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub license: License,
    pub activation_count: i64,
}

/// Fields needed to create (or import) a license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub license_key: String,
    pub customer_name: String,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub expires_at: NaiveDateTime,
    pub max_activations: i64,
    pub restricted_fingerprint: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub generated_at: NaiveDateTime,
}

/// A device activation of a license.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Activation {
    pub id: i64,
    pub license_key: String,
    pub hardware_fingerprint: String,
    pub device_name: Option<String>,
    pub activated_at: NaiveDateTime,
    pub last_validated: Option<NaiveDateTime>,
    pub is_active: bool,
}

/// What [`Database::activate_if_allowed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The device already held an active activation.
    AlreadyActive,
    /// A new activation was recorded under this id.
    Created(i64),
    /// Every activation slot is taken.
    LimitReached,
}

/// An activation joined with the owning license's customer fields.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ActivationRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub activation: Activation,
    pub customer_name: String,
    pub company_name: Option<String>,
    pub expires_at: NaiveDateTime,
}

/// Outcome recorded for an activation or validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    NotFound,
    Blocked,
    Expired,
    RemoteDisabled,
    HardwareMismatch,
    NotImplemented,
    MaxActivations,
    NotActivated,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::NotFound => "not_found",
            ValidationStatus::Blocked => "blocked",
            ValidationStatus::Expired => "expired",
            ValidationStatus::RemoteDisabled => "remote_disabled",
            ValidationStatus::HardwareMismatch => "hardware_mismatch",
            ValidationStatus::NotImplemented => "not_implemented",
            ValidationStatus::MaxActivations => "max_activations",
            ValidationStatus::NotActivated => "not_activated",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the `validation_logs` audit table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ValidationLogEntry {
    pub id: i64,
    pub license_key: Option<String>,
    pub hardware_fingerprint: Option<String>,
    pub status: String,
    pub remote_override: bool,
    pub message: Option<String>,
    pub validated_at: NaiveDateTime,
}

/// Aggregate counters shown on the dashboard overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LicenseStats {
    pub total_licenses: i64,
    pub active_licenses: i64,
    pub expired_licenses: i64,
    pub blocked_licenses: i64,
    pub total_activations: i64,
}

fn db_err(backend: &'static str, op: &'static str) -> impl FnOnce(sqlx::Error) -> LicenseError {
    move |e| {
        error!("{backend} {op} failed: {e}");
        LicenseError::DatabaseError(format!("{op}: {e}"))
    }
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Connect using the global configuration.
    pub async fn new() -> LicenseResult<Arc<Self>> {
        let config = get_config()?;
        Self::connect(&config.database).await
    }

    /// Connect to the backend selected by `db_config.db_type`.
    pub async fn connect(db_config: &DatabaseConfig) -> LicenseResult<Arc<Self>> {
        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::DatabaseError(format!(
                            "failed to connect to PostgreSQL: {e}"
                        ))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Short backend name, for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Create tables if needed and seed the default administrator.
    ///
    /// Safe to run on every start.
    pub async fn migrate(&self) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(db_err("SQLite", "migrate"))?;
                }

                let seeded = query(
                    "INSERT INTO admin_users (username, password_hash, created_at) \
                     VALUES (?, ?, ?) \
                     ON CONFLICT(username) DO NOTHING",
                )
                .bind(DEFAULT_ADMIN_USERNAME)
                .bind(DEFAULT_ADMIN_PASSWORD_HASH)
                .bind(now)
                .execute(pool)
                .await
                .map_err(db_err("SQLite", "seed admin"))?
                .rows_affected();

                if seeded > 0 {
                    info!("Seeded default admin user '{DEFAULT_ADMIN_USERNAME}'");
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(db_err("Postgres", "migrate"))?;
                }

                let seeded = query(
                    "INSERT INTO admin_users (username, password_hash, created_at) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (username) DO NOTHING",
                )
                .bind(DEFAULT_ADMIN_USERNAME)
                .bind(DEFAULT_ADMIN_PASSWORD_HASH)
                .bind(now)
                .execute(pool)
                .await
                .map_err(db_err("Postgres", "seed admin"))?
                .rows_affected();

                if seeded > 0 {
                    info!("Seeded default admin user '{DEFAULT_ADMIN_USERNAME}'");
                }
            }
        }

        Ok(())
    }

    pub async fn get_admin_user(&self, username: &str) -> LicenseResult<Option<AdminUser>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, AdminUser>("SELECT * FROM admin_users WHERE username = ?")
                    .bind(username)
                    .fetch_optional(pool)
                    .await
                    .map_err(db_err("SQLite", "get_admin_user"))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, AdminUser>("SELECT * FROM admin_users WHERE username = $1")
                    .bind(username)
                    .fetch_optional(pool)
                    .await
                    .map_err(db_err("Postgres", "get_admin_user"))
            }
        }
    }

    /// Whether a license with this key already exists.
    pub async fn license_key_exists(&self, license_key: &str) -> LicenseResult<bool> {
        let count: i64 = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_scalar("SELECT COUNT(*) FROM licenses WHERE license_key = ?")
                    .bind(license_key)
                    .fetch_one(pool)
                    .await
                    .map_err(db_err("SQLite", "license_key_exists"))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_scalar("SELECT COUNT(*) FROM licenses WHERE license_key = $1")
                    .bind(license_key)
                    .fetch_one(pool)
                    .await
                    .map_err(db_err("Postgres", "license_key_exists"))?
            }
        };

        Ok(count > 0)
    }

    /// Insert a freshly generated license and return its row id.
    pub async fn insert_license(&self, license: &NewLicense) -> LicenseResult<i64> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar(
                r#"
                INSERT INTO licenses (
                    license_key, customer_name, company_name, email, phone,
                    expires_at, max_activations, restricted_fingerprint, notes,
                    is_blocked, created_by, generated_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&license.license_key)
            .bind(&license.customer_name)
            .bind(&license.company_name)
            .bind(&license.email)
            .bind(&license.phone)
            .bind(license.expires_at)
            .bind(license.max_activations)
            .bind(&license.restricted_fingerprint)
            .bind(&license.notes)
            .bind(&license.created_by)
            .bind(license.generated_at)
            .bind(license.generated_at)
            .fetch_one(pool)
            .await
            .map_err(db_err("SQLite", "insert_license")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar(
                r#"
                INSERT INTO licenses (
                    license_key, customer_name, company_name, email, phone,
                    expires_at, max_activations, restricted_fingerprint, notes,
                    is_blocked, created_by, generated_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10, $11, $12)
                RETURNING id
                "#,
            )
            .bind(&license.license_key)
            .bind(&license.customer_name)
            .bind(&license.company_name)
            .bind(&license.email)
            .bind(&license.phone)
            .bind(license.expires_at)
            .bind(license.max_activations)
            .bind(&license.restricted_fingerprint)
            .bind(&license.notes)
            .bind(&license.created_by)
            .bind(license.generated_at)
            .bind(license.generated_at)
            .fetch_one(pool)
            .await
            .map_err(db_err("Postgres", "insert_license")),
        }
    }

    /// Insert a license pulled from the remote registry.
    ///
    /// On key conflict only the customer name and expiry are refreshed.
    pub async fn import_license(&self, license: &NewLicense) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        license_key, customer_name, company_name, email, phone,
                        expires_at, max_activations, restricted_fingerprint, notes,
                        is_blocked, created_by, generated_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE, ?, ?, ?)
                    ON CONFLICT(license_key) DO UPDATE SET
                        customer_name = excluded.customer_name,
                        expires_at    = excluded.expires_at,
                        updated_at    = excluded.updated_at
                    "#,
                )
                .bind(&license.license_key)
                .bind(&license.customer_name)
                .bind(&license.company_name)
                .bind(&license.email)
                .bind(&license.phone)
                .bind(license.expires_at)
                .bind(license.max_activations)
                .bind(&license.restricted_fingerprint)
                .bind(&license.notes)
                .bind(&license.created_by)
                .bind(license.generated_at)
                .bind(now)
                .execute(pool)
                .await
                .map_err(db_err("SQLite", "import_license"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        license_key, customer_name, company_name, email, phone,
                        expires_at, max_activations, restricted_fingerprint, notes,
                        is_blocked, created_by, generated_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10, $11, $12)
                    ON CONFLICT (license_key) DO UPDATE SET
                        customer_name = EXCLUDED.customer_name,
                        expires_at    = EXCLUDED.expires_at,
                        updated_at    = EXCLUDED.updated_at
                    "#,
                )
                .bind(&license.license_key)
                .bind(&license.customer_name)
                .bind(&license.company_name)
                .bind(&license.email)
                .bind(&license.phone)
                .bind(license.expires_at)
                .bind(license.max_activations)
                .bind(&license.restricted_fingerprint)
                .bind(&license.notes)
                .bind(&license.created_by)
                .bind(license.generated_at)
                .bind(now)
                .execute(pool)
                .await
                .map_err(db_err("Postgres", "import_license"))?;
            }
        }

        Ok(())
    }

    /// Fetch a license by its key.
    ///
    /// Returns:
    /// - `Ok(Some(License))` if found
    /// - `Ok(None)` if not found
    /// - `Err(LicenseError::DatabaseError)` on DB failure
    pub async fn get_license(&self, license_key: &str) -> LicenseResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, License>("SELECT * FROM licenses WHERE license_key = ?")
                    .bind(license_key)
                    .fetch_optional(pool)
                    .await
                    .map_err(db_err("SQLite", "get_license"))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, License>("SELECT * FROM licenses WHERE license_key = $1")
                    .bind(license_key)
                    .fetch_optional(pool)
                    .await
                    .map_err(db_err("Postgres", "get_license"))
            }
        }
    }

    /// List licenses, most recently touched first.
    ///
    /// `updated_after` keeps only rows whose `COALESCE(updated_at, generated_at)`
    /// is strictly later than the given instant.
    pub async fn list_licenses(
        &self,
        limit: i64,
        offset: i64,
        updated_after: Option<NaiveDateTime>,
    ) -> LicenseResult<Vec<LicenseRow>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(
                r#"
                SELECT l.*,
                    (SELECT COUNT(*) FROM activations a
                     WHERE a.license_key = l.license_key AND a.is_active = TRUE) AS activation_count
                FROM licenses l
                WHERE (? IS NULL OR COALESCE(l.updated_at, l.generated_at) > ?)
                ORDER BY COALESCE(l.updated_at, l.generated_at) DESC, l.id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(updated_after)
            .bind(updated_after)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(db_err("SQLite", "list_licenses")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(
                r#"
                SELECT l.*,
                    (SELECT COUNT(*) FROM activations a
                     WHERE a.license_key = l.license_key AND a.is_active = TRUE) AS activation_count
                FROM licenses l
                WHERE ($1::timestamp IS NULL OR COALESCE(l.updated_at, l.generated_at) > $1)
                ORDER BY COALESCE(l.updated_at, l.generated_at) DESC, l.id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(updated_after)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(db_err("Postgres", "list_licenses")),
        }
    }

    /// Set or clear the block flag. Clearing also drops the message.
    ///
    /// Returns `Ok(false)` when no license has this key.
    pub async fn set_blocked(
        &self,
        license_key: &str,
        blocked: bool,
        message: Option<&str>,
    ) -> LicenseResult<bool> {
        let now = Utc::now().naive_utc();
        let message = if blocked { message } else { None };

        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET is_blocked = ?, block_message = ?, updated_at = ? \
                     WHERE license_key = ?",
            )
            .bind(blocked)
            .bind(message)
            .bind(now)
            .bind(license_key)
            .execute(pool)
            .await
            .map_err(db_err("SQLite", "set_blocked"))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET is_blocked = $1, block_message = $2, updated_at = $3 \
                     WHERE license_key = $4",
            )
            .bind(blocked)
            .bind(message)
            .bind(now)
            .bind(license_key)
            .execute(pool)
            .await
            .map_err(db_err("Postgres", "set_blocked"))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Move a license's expiry. Returns `Ok(false)` when the key is unknown.
    pub async fn update_expiry(
        &self,
        license_key: &str,
        expires_at: NaiveDateTime,
    ) -> LicenseResult<bool> {
        let now = Utc::now().naive_utc();

        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses SET expires_at = ?, updated_at = ? WHERE license_key = ?",
            )
            .bind(expires_at)
            .bind(now)
            .bind(license_key)
            .execute(pool)
            .await
            .map_err(db_err("SQLite", "update_expiry"))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses SET expires_at = $1, updated_at = $2 WHERE license_key = $3",
            )
            .bind(expires_at)
            .bind(now)
            .bind(license_key)
            .execute(pool)
            .await
            .map_err(db_err("Postgres", "update_expiry"))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Delete a license and all of its activations in one transaction.
    ///
    /// Returns `Ok(false)` (and rolls back) when there was no license row.
    pub async fn delete_license(&self, license_key: &str) -> LicenseResult<bool> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool.begin().await.map_err(db_err("SQLite", "begin"))?;

                query("DELETE FROM activations WHERE license_key = ?")
                    .bind(license_key)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("SQLite", "delete activations"))?;

                let deleted = query("DELETE FROM licenses WHERE license_key = ?")
                    .bind(license_key)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("SQLite", "delete license"))?
                    .rows_affected();

                if deleted == 0 {
                    tx.rollback().await.map_err(db_err("SQLite", "rollback"))?;
                    return Ok(false);
                }

                tx.commit().await.map_err(db_err("SQLite", "commit"))?;
                Ok(true)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(db_err("Postgres", "begin"))?;

                query("DELETE FROM activations WHERE license_key = $1")
                    .bind(license_key)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("Postgres", "delete activations"))?;

                let deleted = query("DELETE FROM licenses WHERE license_key = $1")
                    .bind(license_key)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("Postgres", "delete license"))?
                    .rows_affected();

                if deleted == 0 {
                    tx.rollback()
                        .await
                        .map_err(db_err("Postgres", "rollback"))?;
                    return Ok(false);
                }

                tx.commit().await.map_err(db_err("Postgres", "commit"))?;
                Ok(true)
            }
        }
    }

    /// All activations of a license, newest first, active or not.
    pub async fn activations_for_license(
        &self,
        license_key: &str,
    ) -> LicenseResult<Vec<Activation>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Activation>(
                "SELECT * FROM activations WHERE license_key = ? \
                 ORDER BY activated_at DESC, id DESC",
            )
            .bind(license_key)
            .fetch_all(pool)
            .await
            .map_err(db_err("SQLite", "activations_for_license")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Activation>(
                "SELECT * FROM activations WHERE license_key = $1 \
                 ORDER BY activated_at DESC, id DESC",
            )
            .bind(license_key)
            .fetch_all(pool)
            .await
            .map_err(db_err("Postgres", "activations_for_license")),
        }
    }

    /// The active activation for this license on this device, if any.
    pub async fn find_active_activation(
        &self,
        license_key: &str,
        hardware_fingerprint: &str,
    ) -> LicenseResult<Option<Activation>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Activation>(
                "SELECT * FROM activations \
                 WHERE license_key = ? AND hardware_fingerprint = ? AND is_active = TRUE \
                 LIMIT 1",
            )
            .bind(license_key)
            .bind(hardware_fingerprint)
            .fetch_optional(pool)
            .await
            .map_err(db_err("SQLite", "find_active_activation")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Activation>(
                "SELECT * FROM activations \
                 WHERE license_key = $1 AND hardware_fingerprint = $2 AND is_active = TRUE \
                 LIMIT 1",
            )
            .bind(license_key)
            .bind(hardware_fingerprint)
            .fetch_optional(pool)
            .await
            .map_err(db_err("Postgres", "find_active_activation")),
        }
    }

    /// Activate a device unless the license is out of slots.
    ///
    /// The device lookup, the slot count and the insert share one
    /// transaction. SQLite takes the write lock up front (`BEGIN IMMEDIATE`),
    /// Postgres locks the license row.
    pub async fn activate_if_allowed(
        &self,
        license_key: &str,
        hardware_fingerprint: &str,
        device_name: Option<&str>,
        max_activations: i64,
    ) -> LicenseResult<ActivationOutcome> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin_with("BEGIN IMMEDIATE")
                    .await
                    .map_err(db_err("SQLite", "begin immediate"))?;

                let existing: Option<i64> = query_scalar(
                    "SELECT id FROM activations \
                     WHERE license_key = ? AND hardware_fingerprint = ? AND is_active = TRUE \
                     LIMIT 1",
                )
                .bind(license_key)
                .bind(hardware_fingerprint)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("SQLite", "find active activation"))?;

                let outcome = if existing.is_some() {
                    ActivationOutcome::AlreadyActive
                } else {
                    let active: i64 = query_scalar(
                        "SELECT COUNT(*) FROM activations \
                         WHERE license_key = ? AND is_active = TRUE",
                    )
                    .bind(license_key)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err("SQLite", "count active activations"))?;

                    if active >= max_activations {
                        ActivationOutcome::LimitReached
                    } else {
                        let id: i64 = query_scalar(
                            "INSERT INTO activations \
                                 (license_key, hardware_fingerprint, device_name, activated_at, is_active) \
                             VALUES (?, ?, ?, ?, TRUE) \
                             RETURNING id",
                        )
                        .bind(license_key)
                        .bind(hardware_fingerprint)
                        .bind(device_name)
                        .bind(now)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(db_err("SQLite", "insert activation"))?;
                        ActivationOutcome::Created(id)
                    }
                };

                tx.commit().await.map_err(db_err("SQLite", "commit"))?;
                Ok(outcome)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool.begin().await.map_err(db_err("Postgres", "begin"))?;

                let locked: Option<i64> =
                    query_scalar("SELECT id FROM licenses WHERE license_key = $1 FOR UPDATE")
                        .bind(license_key)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db_err("Postgres", "lock license"))?;

                if locked.is_none() {
                    tx.rollback()
                        .await
                        .map_err(db_err("Postgres", "rollback"))?;
                    return Err(LicenseError::InvalidLicense(format!(
                        "license {license_key} no longer exists"
                    )));
                }

                let existing: Option<i64> = query_scalar(
                    "SELECT id FROM activations \
                     WHERE license_key = $1 AND hardware_fingerprint = $2 AND is_active = TRUE \
                     LIMIT 1",
                )
                .bind(license_key)
                .bind(hardware_fingerprint)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("Postgres", "find active activation"))?;

                let outcome = if existing.is_some() {
                    ActivationOutcome::AlreadyActive
                } else {
                    let active: i64 = query_scalar(
                        "SELECT COUNT(*) FROM activations \
                         WHERE license_key = $1 AND is_active = TRUE",
                    )
                    .bind(license_key)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err("Postgres", "count active activations"))?;

                    if active >= max_activations {
                        ActivationOutcome::LimitReached
                    } else {
                        let id: i64 = query_scalar(
                            "INSERT INTO activations \
                                 (license_key, hardware_fingerprint, device_name, activated_at, is_active) \
                             VALUES ($1, $2, $3, $4, TRUE) \
                             RETURNING id",
                        )
                        .bind(license_key)
                        .bind(hardware_fingerprint)
                        .bind(device_name)
                        .bind(now)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(db_err("Postgres", "insert activation"))?;
                        ActivationOutcome::Created(id)
                    }
                };

                tx.commit().await.map_err(db_err("Postgres", "commit"))?;
                Ok(outcome)
            }
        }
    }

    /// Record a new active activation and return its id.
    pub async fn insert_activation(
        &self,
        license_key: &str,
        hardware_fingerprint: &str,
        device_name: Option<&str>,
    ) -> LicenseResult<i64> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar(
                "INSERT INTO activations \
                     (license_key, hardware_fingerprint, device_name, activated_at, is_active) \
                 VALUES (?, ?, ?, ?, TRUE) \
                 RETURNING id",
            )
            .bind(license_key)
            .bind(hardware_fingerprint)
            .bind(device_name)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(db_err("SQLite", "insert_activation")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar(
                "INSERT INTO activations \
                     (license_key, hardware_fingerprint, device_name, activated_at, is_active) \
                 VALUES ($1, $2, $3, $4, TRUE) \
                 RETURNING id",
            )
            .bind(license_key)
            .bind(hardware_fingerprint)
            .bind(device_name)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(db_err("Postgres", "insert_activation")),
        }
    }

    /// Most recent activations across all licenses, with customer fields.
    pub async fn list_activations(&self, limit: i64) -> LicenseResult<Vec<ActivationRow>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, ActivationRow>(
                r#"
                SELECT a.*, l.customer_name, l.company_name, l.expires_at
                FROM activations a
                JOIN licenses l ON a.license_key = l.license_key
                ORDER BY a.activated_at DESC, a.id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(db_err("SQLite", "list_activations")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, ActivationRow>(
                r#"
                SELECT a.*, l.customer_name, l.company_name, l.expires_at
                FROM activations a
                JOIN licenses l ON a.license_key = l.license_key
                ORDER BY a.activated_at DESC, a.id DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(db_err("Postgres", "list_activations")),
        }
    }

    /// Mark an activation inactive. Returns `Ok(false)` for an unknown id.
    pub async fn deactivate_activation(&self, activation_id: i64) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("UPDATE activations SET is_active = FALSE WHERE id = ?")
                .bind(activation_id)
                .execute(pool)
                .await
                .map_err(db_err("SQLite", "deactivate_activation"))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE activations SET is_active = FALSE WHERE id = $1")
                    .bind(activation_id)
                    .execute(pool)
                    .await
                    .map_err(db_err("Postgres", "deactivate_activation"))?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }

    pub async fn touch_last_validated(&self, activation_id: i64) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("UPDATE activations SET last_validated = ? WHERE id = ?")
                    .bind(now)
                    .bind(activation_id)
                    .execute(pool)
                    .await
                    .map_err(db_err("SQLite", "touch_last_validated"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE activations SET last_validated = $1 WHERE id = $2")
                    .bind(now)
                    .bind(activation_id)
                    .execute(pool)
                    .await
                    .map_err(db_err("Postgres", "touch_last_validated"))?;
            }
        }

        Ok(())
    }

    /// Append an entry to the validation audit log.
    pub async fn log_validation(
        &self,
        license_key: &str,
        hardware_fingerprint: &str,
        status: ValidationStatus,
        remote_override: bool,
        message: Option<&str>,
    ) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    "INSERT INTO validation_logs \
                         (license_key, hardware_fingerprint, status, remote_override, message, validated_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(license_key)
                .bind(hardware_fingerprint)
                .bind(status.as_str())
                .bind(remote_override)
                .bind(message)
                .bind(now)
                .execute(pool)
                .await
                .map_err(db_err("SQLite", "log_validation"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "INSERT INTO validation_logs \
                         (license_key, hardware_fingerprint, status, remote_override, message, validated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(license_key)
                .bind(hardware_fingerprint)
                .bind(status.as_str())
                .bind(remote_override)
                .bind(message)
                .bind(now)
                .execute(pool)
                .await
                .map_err(db_err("Postgres", "log_validation"))?;
            }
        }

        Ok(())
    }

    /// Audit entries for a license, oldest first.
    pub async fn validation_logs_for(
        &self,
        license_key: &str,
    ) -> LicenseResult<Vec<ValidationLogEntry>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, ValidationLogEntry>(
                "SELECT * FROM validation_logs WHERE license_key = ? ORDER BY id ASC",
            )
            .bind(license_key)
            .fetch_all(pool)
            .await
            .map_err(db_err("SQLite", "validation_logs_for")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, ValidationLogEntry>(
                "SELECT * FROM validation_logs WHERE license_key = $1 ORDER BY id ASC",
            )
            .bind(license_key)
            .fetch_all(pool)
            .await
            .map_err(db_err("Postgres", "validation_logs_for")),
        }
    }

    /// Dashboard counters evaluated against `now`.
    ///
    /// A license is expired once `expires_at <= now` and active while it is
    /// neither expired nor blocked.
    pub async fn stats(&self, now: NaiveDateTime) -> LicenseResult<LicenseStats> {
        let (total_licenses, active_licenses, expired_licenses, blocked_licenses, total_activations) =
            match self {
                #[cfg(feature = "sqlite")]
                Database::SQLite(pool) => query_as::<_, (i64, i64, i64, i64, i64)>(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM licenses),
                        (SELECT COUNT(*) FROM licenses WHERE expires_at > ? AND is_blocked = FALSE),
                        (SELECT COUNT(*) FROM licenses WHERE expires_at <= ?),
                        (SELECT COUNT(*) FROM licenses WHERE is_blocked = TRUE),
                        (SELECT COUNT(*) FROM activations WHERE is_active = TRUE)
                    "#,
                )
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(db_err("SQLite", "stats"))?,
                #[cfg(feature = "postgres")]
                Database::Postgres(pool) => query_as::<_, (i64, i64, i64, i64, i64)>(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM licenses),
                        (SELECT COUNT(*) FROM licenses WHERE expires_at > $1 AND is_blocked = FALSE),
                        (SELECT COUNT(*) FROM licenses WHERE expires_at <= $1),
                        (SELECT COUNT(*) FROM licenses WHERE is_blocked = TRUE),
                        (SELECT COUNT(*) FROM activations WHERE is_active = TRUE)
                    "#,
                )
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(db_err("Postgres", "stats"))?,
            };

        Ok(LicenseStats {
            total_licenses,
            active_licenses,
            expired_licenses,
            blocked_licenses,
            total_activations,
        })
    }
}
