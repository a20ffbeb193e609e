//! Page views mounted by the dashboard shell.
//!
//! Each page loads its own data when mounted and renders as plain text via
//! `Display`. Mutating actions re-fetch the page data afterwards, whether or
//! not the mutation succeeded.

use std::fmt;

use chrono::NaiveDateTime;

pub mod activations;
pub mod generate;
pub mod licenses;
pub mod overview;

pub use activations::ActivationsPage;
pub use generate::GeneratePage;
pub use licenses::LicensesPage;
pub use overview::OverviewPage;

use crate::dashboard::errors::DashboardResult;

/// The page currently mounted in the shell.
#[derive(Debug)]
pub enum Page {
    Overview(OverviewPage),
    Generate(GeneratePage),
    Licenses(LicensesPage),
    Activations(ActivationsPage),
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Page::Overview(page) => page.fmt(f),
            Page::Generate(page) => page.fmt(f),
            Page::Licenses(page) => page.fmt(f),
            Page::Activations(page) => page.fmt(f),
        }
    }
}

pub(crate) fn format_date(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_datetime(value: Option<NaiveDateTime>) -> String {
    value
        .map(|v| v.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

/// Run a mutation, then re-fetch with `refresh`.
///
/// The mutation's error takes precedence over a failed re-fetch.
pub(crate) async fn then_refresh<T, F>(result: DashboardResult<T>, refresh: F) -> DashboardResult<T>
where
    F: std::future::Future<Output = DashboardResult<()>>,
{
    let refreshed = refresh.await;
    let value = result?;
    refreshed?;
    Ok(value)
}
