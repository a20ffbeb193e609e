//! License key generation and format checks.
//!
//! Keys look like `WB-3F9A12C4-7E0B55D1`: a prefix followed by segments of
//! uppercase hex. Each segment is cut from a fresh random UUIDv4, so
//! segments are independent of each other.

use uuid::Uuid;

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Longest segment a single UUID can supply.
const MAX_SEGMENT_LENGTH: usize = 32;

/// Configuration for license key generation.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    /// Prefix for the license key (e.g., "WB")
    pub prefix: String,
    /// Number of segments after the prefix
    pub segments: u8,
    /// Length of each segment (at most 32)
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "WB".to_string(),
            segments: 2,
            segment_length: 8,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

fn generate_segment(length: u8) -> String {
    let len = usize::from(length).min(MAX_SEGMENT_LENGTH);
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    hex[..len].to_string()
}

/// Generate a license key with the given configuration.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let segments: Vec<String> = (0..config.segments)
        .map(|_| generate_segment(config.segment_length))
        .collect();

    format!("{}-{}", config.prefix, segments.join("-"))
}

/// Check that a key has the configured prefix, segment count and segment shape.
pub fn validate_license_key_format(key: &str, config: &LicenseKeyConfig) -> bool {
    let mut parts = key.split('-');

    if parts.next() != Some(config.prefix.as_str()) {
        return false;
    }

    let segments: Vec<&str> = parts.collect();
    if segments.len() != usize::from(config.segments) {
        return false;
    }

    let expected_len = usize::from(config.segment_length).min(MAX_SEGMENT_LENGTH);
    segments.iter().all(|segment| {
        segment.len() == expected_len
            && segment
                .chars()
                .all(|ch| ch.is_ascii_digit() || ('A'..='F').contains(&ch))
    })
}

/// Generate a key that `exists_fn` reports as unused.
///
/// Retries up to `max_retries` times before giving up.
pub async fn generate_unique_license_key<F, Fut>(
    config: &LicenseKeyConfig,
    exists_fn: F,
    max_retries: u32,
) -> LicenseResult<String>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = LicenseResult<bool>>,
{
    for _ in 0..max_retries {
        let key = generate_license_key(config);
        if !exists_fn(key.clone()).await? {
            return Ok(key);
        }
    }

    Err(LicenseError::ServerError(format!(
        "failed to generate unique license key after {max_retries} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_shape() {
        let key = generate_license_key(&LicenseKeyConfig::default());

        assert!(key.starts_with("WB-"));
        assert_eq!(key.len(), "WB-".len() + 8 + 1 + 8);

        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 3);
        for segment in &parts[1..] {
            assert_eq!(segment.len(), 8);
            assert!(segment
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn custom_config_is_respected() {
        let config = LicenseKeyConfig {
            prefix: "PRO".to_string(),
            segments: 4,
            segment_length: 5,
        };
        let key = generate_license_key(&config);

        assert!(key.starts_with("PRO-"));
        assert!(validate_license_key_format(&key, &config));
        assert_eq!(key.split('-').count(), 5);
    }

    #[test]
    fn oversized_segments_are_capped() {
        let config = LicenseKeyConfig {
            prefix: "X".to_string(),
            segments: 1,
            segment_length: 40,
        };
        let key = generate_license_key(&config);
        assert_eq!(key.len(), "X-".len() + 32);
    }

    #[test]
    fn format_check_rejects_bad_keys() {
        let config = LicenseKeyConfig::default();

        assert!(validate_license_key_format("WB-3F9A12C4-7E0B55D1", &config));
        assert!(!validate_license_key_format("LIC-3F9A12C4-7E0B55D1", &config));
        assert!(!validate_license_key_format("WB-3F9A12C4", &config));
        assert!(!validate_license_key_format("WB-3F9A12C4-7E0B55D1-AAAAAAAA", &config));
        assert!(!validate_license_key_format("WB-3f9a12c4-7E0B55D1", &config));
        assert!(!validate_license_key_format("WB-3F9A12G4-7E0B55D1", &config));
    }

    #[test]
    fn generated_keys_are_unique() {
        let config = LicenseKeyConfig::default();
        let mut keys = std::collections::HashSet::new();

        for _ in 0..1000 {
            let key = generate_license_key(&config);
            assert!(keys.insert(key.clone()), "Duplicate key generated: {}", key);
        }
    }

    #[tokio::test]
    async fn unique_generation_gives_up_after_retries() {
        let config = LicenseKeyConfig::default();
        let result = generate_unique_license_key(&config, |_| async { Ok(true) }, 3).await;
        assert!(matches!(result, Err(LicenseError::ServerError(_))));

        let key = generate_unique_license_key(&config, |_| async { Ok(false) }, 3)
            .await
            .unwrap();
        assert!(validate_license_key_format(&key, &config));
    }
}
