//! Dashboard shell: navigation and page mounting.

use std::fmt;

use crate::dashboard::api::{AdminApi, GenerateForm};
use crate::dashboard::errors::DashboardResult;
use crate::dashboard::pages::{ActivationsPage, GeneratePage, LicensesPage, OverviewPage, Page};
use crate::dashboard::status::LicenseFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Overview,
    Generate,
    Licenses,
    Activations,
}

impl Route {
    /// Navigation order.
    pub const ALL: [Route; 4] = [
        Route::Overview,
        Route::Generate,
        Route::Licenses,
        Route::Activations,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Overview => "/",
            Route::Generate => "/generate",
            Route::Licenses => "/licenses",
            Route::Activations => "/activations",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Route::Overview => "Overview",
            Route::Generate => "Generate License",
            Route::Licenses => "All Licenses",
            Route::Activations => "Activations",
        }
    }

    /// Route for a path. `/` matches only itself, other routes match by
    /// prefix. Unknown paths fall back to the overview.
    pub fn from_path(path: &str) -> Route {
        Route::ALL
            .into_iter()
            .skip(1)
            .find(|route| path.starts_with(route.path()))
            .unwrap_or(Route::Overview)
    }
}

/// What the shell mounts for a route.
#[derive(Debug, Clone)]
pub enum Mount {
    Overview,
    Generate(GenerateForm),
    Licenses(LicenseFilter),
    Activations,
}

impl Mount {
    pub fn route(&self) -> Route {
        match self {
            Mount::Overview => Route::Overview,
            Mount::Generate(_) => Route::Generate,
            Mount::Licenses(_) => Route::Licenses,
            Mount::Activations => Route::Activations,
        }
    }
}

/// Header and navigation bar with the current route highlighted.
#[derive(Debug, Clone, Copy)]
pub struct Nav {
    pub current: Route,
}

impl fmt::Display for Nav {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "License Admin Panel")?;
        let items: Vec<String> = Route::ALL
            .iter()
            .map(|route| {
                if *route == self.current {
                    format!("[{}]", route.label())
                } else {
                    route.label().to_string()
                }
            })
            .collect();
        writeln!(f, "{}", items.join(" | "))
    }
}

/// The authenticated dashboard. Mounts exactly one page at a time.
pub struct Shell<'a> {
    api: &'a AdminApi,
}

impl<'a> Shell<'a> {
    pub fn new(api: &'a AdminApi) -> Self {
        Self { api }
    }

    /// Load the page for `mount`. The generate page fetches nothing until
    /// submitted.
    pub async fn mount(&self, mount: Mount) -> DashboardResult<Page> {
        Ok(match mount {
            Mount::Overview => Page::Overview(OverviewPage::load(self.api).await?),
            Mount::Generate(form) => Page::Generate(GeneratePage::new(form)),
            Mount::Licenses(filter) => Page::Licenses(LicensesPage::load(self.api, filter).await?),
            Mount::Activations => Page::Activations(ActivationsPage::load(self.api).await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_matches_only_itself() {
        assert_eq!(Route::from_path("/"), Route::Overview);
        assert_eq!(Route::from_path("/licenses"), Route::Licenses);
        assert_eq!(Route::from_path("/licenses/WB-1"), Route::Licenses);
        assert_eq!(Route::from_path("/activations"), Route::Activations);
        assert_eq!(Route::from_path("/nowhere"), Route::Overview);
    }

    #[test]
    fn nav_highlights_current_route() {
        let text = Nav {
            current: Route::Generate,
        }
        .to_string();
        assert!(text.contains("[Generate License]"));
        assert!(text.contains("Overview | [Generate License] | All Licenses | Activations"));
    }

    #[test]
    fn mount_maps_to_route() {
        assert_eq!(Mount::Licenses(LicenseFilter::All).route(), Route::Licenses);
        assert_eq!(Mount::Generate(GenerateForm::default()).route(), Route::Generate);
    }
}
