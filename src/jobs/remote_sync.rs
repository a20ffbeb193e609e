//! Full push of local licenses to the remote registry.
//!
//! The registry may lose or miss single-license pushes (cold starts,
//! timeouts), so the whole table is re-pushed periodically.

use tracing::{debug, info};

use crate::server::database::Database;
use crate::server::remote::{PushSummary, RemoteRegistry};

use super::JobError;

/// Page size used when pushing every license.
const MIGRATION_PAGE_SIZE: i64 = 500;

/// Push up to `limit` licenses, most recently touched first.
///
/// Returns without touching the network when sync is disabled.
pub async fn run_remote_sync(
    db: &Database,
    remote: &RemoteRegistry,
    limit: i64,
) -> Result<PushSummary, JobError> {
    if !remote.sync_enabled() {
        debug!("Remote sync not configured, skipping full sync");
        return Ok(PushSummary::default());
    }

    info!("Starting scheduled full sync to remote");

    let rows = db.list_licenses(limit, 0, None).await?;
    let licenses: Vec<_> = rows.into_iter().map(|row| row.license).collect();
    let summary = remote.push_all(&licenses).await;

    info!(
        "Scheduled sync complete: Pushed {}/{} licenses",
        summary.pushed,
        licenses.len()
    );

    Ok(summary)
}

/// Push every license once, page by page.
///
/// Used to seed a fresh registry.
pub async fn migrate_all_licenses(
    db: &Database,
    remote: &RemoteRegistry,
) -> Result<PushSummary, JobError> {
    if !remote.sync_enabled() {
        return Err(JobError::ExecutionError(
            "remote registry is not configured (set remote.url and remote.admin_token)"
                .to_string(),
        ));
    }

    let mut total = PushSummary::default();
    let mut offset = 0;

    loop {
        let rows = db.list_licenses(MIGRATION_PAGE_SIZE, offset, None).await?;
        if rows.is_empty() {
            break;
        }

        let page_len = rows.len() as i64;
        let licenses: Vec<_> = rows.into_iter().map(|row| row.license).collect();
        let summary = remote.push_all(&licenses).await;
        total.pushed += summary.pushed;
        total.failed += summary.failed;

        info!(
            "Migrated {} licenses so far ({} failed)",
            total.pushed, total.failed
        );

        if page_len < MIGRATION_PAGE_SIZE {
            break;
        }
        offset += page_len;
    }

    Ok(total)
}

