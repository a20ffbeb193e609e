//! Display-only status labels.
//!
//! These are derived from the records the server returned and the local
//! clock. The server remains the authority; a label can be stale.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::dashboard::api::{ActivationRecord, LicenseRecord};

/// Placeholder for activations without a device name.
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Number of fingerprint characters shown in tables.
pub const FINGERPRINT_PREVIEW_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseStatus {
    Active,
    Expired,
    Blocked,
}

impl LicenseStatus {
    /// Blocked wins over Expired, which wins over Active.
    pub fn of(license: &LicenseRecord, now: NaiveDateTime) -> Self {
        if license.is_blocked {
            LicenseStatus::Blocked
        } else if license.expires_at < now {
            LicenseStatus::Expired
        } else {
            LicenseStatus::Active
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LicenseStatus::Active => "Active",
            LicenseStatus::Expired => "Expired",
            LicenseStatus::Blocked => "Blocked",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Filter tabs on the licenses page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LicenseFilter {
    #[default]
    All,
    Active,
    Expired,
    Blocked,
}

impl LicenseFilter {
    pub const TABS: [LicenseFilter; 4] = [
        LicenseFilter::All,
        LicenseFilter::Active,
        LicenseFilter::Expired,
        LicenseFilter::Blocked,
    ];

    /// Whether `license` belongs under this tab.
    ///
    /// Tabs overlap: a blocked license past its expiry shows under both
    /// Expired and Blocked.
    pub fn matches(self, license: &LicenseRecord, now: NaiveDateTime) -> bool {
        match self {
            LicenseFilter::All => true,
            LicenseFilter::Active => !license.is_blocked && license.expires_at > now,
            LicenseFilter::Expired => license.expires_at < now,
            LicenseFilter::Blocked => license.is_blocked,
        }
    }

    pub fn apply<'a>(
        self,
        licenses: &'a [LicenseRecord],
        now: NaiveDateTime,
    ) -> Vec<&'a LicenseRecord> {
        licenses.iter().filter(|l| self.matches(l, now)).collect()
    }

    /// Tab caption. Only All carries a count, of the unfiltered list.
    pub fn tab_label(self, total: usize) -> String {
        match self {
            LicenseFilter::All => format!("All ({total})"),
            LicenseFilter::Active => "Active".to_string(),
            LicenseFilter::Expired => "Expired".to_string(),
            LicenseFilter::Blocked => "Blocked".to_string(),
        }
    }
}

impl FromStr for LicenseFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(LicenseFilter::All),
            "active" => Ok(LicenseFilter::Active),
            "expired" => Ok(LicenseFilter::Expired),
            "blocked" => Ok(LicenseFilter::Blocked),
            other => Err(format!(
                "unknown filter '{other}' (expected all, active, expired or blocked)"
            )),
        }
    }
}

/// First 16 characters of a fingerprint followed by `...`.
pub fn fingerprint_preview(fingerprint: &str) -> String {
    let head: String = fingerprint.chars().take(FINGERPRINT_PREVIEW_LEN).collect();
    format!("{head}...")
}

pub fn device_label(activation: &ActivationRecord) -> &str {
    activation
        .device_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_DEVICE)
}

pub fn activation_label(activation: &ActivationRecord) -> &'static str {
    if activation.is_active {
        "Active"
    } else {
        "Inactive"
    }
}
