use std::fmt;

use crate::dashboard::api::{ActivationRecord, AdminApi, MessageResult};
use crate::dashboard::errors::DashboardResult;
use crate::dashboard::pages::{format_date, format_datetime, then_refresh};
use crate::dashboard::status::{activation_label, device_label, fingerprint_preview};

pub const EMPTY_MESSAGE: &str = "No activations found";

#[derive(Debug, Clone)]
pub struct ActivationsPage {
    activations: Vec<ActivationRecord>,
}

impl ActivationsPage {
    pub async fn load(api: &AdminApi) -> DashboardResult<Self> {
        Ok(Self::with_activations(api.activations().await?))
    }

    pub fn with_activations(activations: Vec<ActivationRecord>) -> Self {
        Self { activations }
    }

    pub fn activations(&self) -> &[ActivationRecord] {
        &self.activations
    }

    pub async fn refresh(&mut self, api: &AdminApi) -> DashboardResult<()> {
        self.activations = api.activations().await?;
        Ok(())
    }

    pub async fn deactivate(
        &mut self,
        api: &AdminApi,
        activation_id: i64,
    ) -> DashboardResult<MessageResult> {
        let result = api.deactivate(activation_id).await;
        then_refresh(result, self.refresh(api)).await
    }
}

impl fmt::Display for ActivationsPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device Activations")?;
        writeln!(f)?;

        if self.activations.is_empty() {
            return writeln!(f, "{EMPTY_MESSAGE}");
        }

        writeln!(
            f,
            "{:>6} {:<28} {:<20} {:<20} {:<19} {:<10} {:<19} {:<8} {}",
            "ID",
            "License Key",
            "Customer",
            "Device Name",
            "Hardware ID",
            "Activated",
            "Last Validation",
            "Status",
            "Actions"
        )?;

        for activation in &self.activations {
            let action = if activation.is_active {
                "deactivate"
            } else {
                ""
            };
            writeln!(
                f,
                "{:>6} {:<28} {:<20} {:<20} {:<19} {:<10} {:<19} {:<8} {}",
                activation.id,
                activation.license_key,
                activation.customer_name.as_deref().unwrap_or("-"),
                device_label(activation),
                fingerprint_preview(&activation.hardware_fingerprint),
                format_date(activation.activated_at),
                format_datetime(activation.last_validated),
                activation_label(activation),
                action,
            )?;
        }
        Ok(())
    }
}
