use std::fmt;

use crate::dashboard::api::{AdminApi, GenerateForm, GenerateResult};
use crate::dashboard::errors::{DashboardError, DashboardResult};

/// Generate-license form with the outcome of the last submission.
#[derive(Debug, Clone, Default)]
pub struct GeneratePage {
    pub form: GenerateForm,
    result: Option<GenerateResult>,
    error: Option<String>,
}

impl GeneratePage {
    pub fn new(form: GenerateForm) -> Self {
        Self {
            form,
            ..Self::default()
        }
    }

    pub fn result(&self) -> Option<&GenerateResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Submit the form.
    ///
    /// On success the returned key is kept and the form resets to its
    /// defaults. On failure the form is left as entered and the error is
    /// shown inline, and [`DashboardError::ActionFailed`] is returned.
    pub async fn submit(&mut self, api: &AdminApi) -> DashboardResult<()> {
        self.result = None;
        self.error = None;

        match api.generate(&self.form).await {
            Ok(result) => {
                self.result = Some(result);
                self.form = GenerateForm::default();
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(DashboardError::ActionFailed(
                    "License was not generated".to_string(),
                ))
            }
        }
    }
}

impl fmt::Display for GeneratePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generate New License")?;
        writeln!(f)?;

        if let Some(result) = &self.result {
            writeln!(f, "License Generated Successfully!")?;
            writeln!(f, "License Key: {}", result.license_key)?;
            writeln!(f, "Save this license key and share it with the customer.")?;
        }

        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
            writeln!(f, "  Customer: {}", self.form.customer_name)?;
            writeln!(f, "  Expires:  {}", self.form.expires_at)?;
            writeln!(f, "  Bound to: {}", self.form.restricted_fingerprint)?;
        }
        Ok(())
    }
}
