use std::fmt;

use chrono::{NaiveDateTime, Utc};

use crate::dashboard::api::{AdminApi, LicenseRecord, MessageResult};
use crate::dashboard::errors::{DashboardError, DashboardResult};
use crate::dashboard::pages::{format_date, then_refresh};
use crate::dashboard::status::{LicenseFilter, LicenseStatus};

#[derive(Debug, Clone)]
pub struct LicensesPage {
    licenses: Vec<LicenseRecord>,
    filter: LicenseFilter,
    now: NaiveDateTime,
}

impl LicensesPage {
    pub async fn load(api: &AdminApi, filter: LicenseFilter) -> DashboardResult<Self> {
        Ok(Self::with_licenses(api.licenses().await?, filter))
    }

    pub fn with_licenses(licenses: Vec<LicenseRecord>, filter: LicenseFilter) -> Self {
        Self {
            licenses,
            filter,
            now: Utc::now().naive_utc(),
        }
    }

    pub fn licenses(&self) -> &[LicenseRecord] {
        &self.licenses
    }

    pub fn filter(&self) -> LicenseFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: LicenseFilter) {
        self.filter = filter;
    }

    /// Licenses under the selected tab.
    pub fn visible(&self) -> Vec<&LicenseRecord> {
        self.filter.apply(&self.licenses, self.now)
    }

    pub async fn refresh(&mut self, api: &AdminApi) -> DashboardResult<()> {
        self.licenses = api.licenses().await?;
        self.now = Utc::now().naive_utc();
        Ok(())
    }

    pub async fn block(
        &mut self,
        api: &AdminApi,
        license_key: &str,
        message: Option<&str>,
    ) -> DashboardResult<MessageResult> {
        let result = api.block(license_key, message).await;
        then_refresh(result, self.refresh(api)).await
    }

    pub async fn unblock(
        &mut self,
        api: &AdminApi,
        license_key: &str,
    ) -> DashboardResult<MessageResult> {
        let result = api.unblock(license_key).await;
        then_refresh(result, self.refresh(api)).await
    }

    pub async fn delete(
        &mut self,
        api: &AdminApi,
        license_key: &str,
    ) -> DashboardResult<MessageResult> {
        let result = api.delete_license(license_key).await;
        then_refresh(result, self.refresh(api)).await
    }
}

/// Operator-facing text for a failed delete.
pub fn delete_failure_message(err: &DashboardError) -> String {
    match err {
        DashboardError::Api { detail, .. } => format!(
            "Failed to delete: {}",
            detail.as_deref().unwrap_or("Unknown error")
        ),
        other => format!("Failed to delete license ({other})"),
    }
}

impl fmt::Display for LicensesPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All Licenses")?;

        let tabs: Vec<String> = LicenseFilter::TABS
            .iter()
            .map(|tab| {
                let label = tab.tab_label(self.licenses.len());
                if *tab == self.filter {
                    format!("[{label}]")
                } else {
                    label
                }
            })
            .collect();
        writeln!(f, "{}", tabs.join("  "))?;
        writeln!(f)?;

        writeln!(
            f,
            "{:<28} {:<20} {:<16} {:<10} {:>11} {:<8} {}",
            "License Key", "Customer", "Company", "Expires", "Activations", "Status", "Actions"
        )?;

        for license in self.visible() {
            let status = LicenseStatus::of(license, self.now);
            let toggle = if license.is_blocked { "unblock" } else { "block" };
            writeln!(
                f,
                "{:<28} {:<20} {:<16} {:<10} {:>11} {:<8} {}, delete",
                license.license_key,
                license.customer_name,
                license.company_name.as_deref().unwrap_or("-"),
                format_date(license.expires_at),
                format!("{} / {}", license.activation_count, license.max_activations),
                status,
                toggle,
            )?;
        }
        Ok(())
    }
}
