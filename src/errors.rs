//! Crate-wide error type.

use thiserror::Error;

/// Errors produced by the license server and the remote sync layer.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Input or stored data did not describe a usable license.
    #[error("invalid license: {0}")]
    InvalidLicense(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An outbound HTTP call failed at the transport level.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A database query or connection failed.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Anything else the server could not complete.
    #[error("server error: {0}")]
    ServerError(String),
}

/// Convenience alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[cfg(feature = "server")]
impl From<sqlx::Error> for LicenseError {
    fn from(err: sqlx::Error) -> Self {
        LicenseError::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = LicenseError::ConfigError("server.port must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "configuration error: server.port must be greater than 0"
        );
    }
}
