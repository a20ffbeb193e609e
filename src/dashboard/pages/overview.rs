use std::fmt;

use crate::dashboard::api::{AdminApi, Stats};
use crate::dashboard::errors::DashboardResult;

#[derive(Debug, Clone)]
pub struct OverviewPage {
    stats: Stats,
}

impl OverviewPage {
    pub async fn load(api: &AdminApi) -> DashboardResult<Self> {
        Ok(Self::from_stats(api.stats().await?))
    }

    pub fn from_stats(stats: Stats) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub async fn refresh(&mut self, api: &AdminApi) -> DashboardResult<()> {
        self.stats = api.stats().await?;
        Ok(())
    }

    /// The five counters in display order.
    pub fn cards(&self) -> [(&'static str, i64); 5] {
        [
            ("Total Licenses", self.stats.total_licenses),
            ("Active Licenses", self.stats.active_licenses),
            ("Expired Licenses", self.stats.expired_licenses),
            ("Blocked Licenses", self.stats.blocked_licenses),
            ("Total Activations", self.stats.total_activations),
        ]
    }
}

impl fmt::Display for OverviewPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dashboard Overview")?;
        writeln!(f)?;
        for (label, value) in self.cards() {
            writeln!(f, "  {label:<20} {value:>8}")?;
        }
        Ok(())
    }
}
