//! License server binary.
//!
//! `licensehub_server` serves the admin and client APIs. The
//! `migrate-remote` subcommand pushes every local license to the remote
//! registry once and exits.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use licensehub::config::get_config;
use licensehub::jobs::migrate_all_licenses;
use licensehub::license_key::LicenseKeyConfig;
use licensehub::server::{build_router, AppState, Database, RemoteRegistry};

#[derive(Parser, Debug)]
#[command(name = "licensehub_server")]
#[command(about = "License server with hardware-bound activations")]
#[command(version)]
struct Cli {
    /// Bind address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Push every local license to the remote registry and exit
    MigrateRemote,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = get_config()?;

    licensehub::init_tracing(&config.logging.level);

    let db = Database::new().await?;
    db.migrate().await?;
    info!("Database ready ({})", db.backend_name());

    let remote = RemoteRegistry::new(config.remote.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::MigrateRemote => {
            let summary = migrate_all_licenses(&db, &remote).await?;
            info!(
                "Migration complete: {} pushed, {} errors",
                summary.pushed, summary.failed
            );
            Ok(())
        }
        Command::Serve => {
            if remote.sync_enabled() {
                info!("Remote sync: Enabled");
            } else {
                warn!("Remote sync: Disabled (remote.url or remote.admin_token not set)");
            }

            let state = AppState::new(
                db.clone(),
                remote,
                LicenseKeyConfig::from(&config.license),
            );

            #[cfg(feature = "background-jobs")]
            let _scheduler = if state.remote.sync_enabled() {
                use licensehub::jobs::{JobConfig, JobScheduler};

                let scheduler = JobScheduler::new(
                    state.db.clone(),
                    state.remote.clone(),
                    JobConfig::from(&config.remote),
                )
                .await?;
                scheduler.start().await?;
                Some(scheduler)
            } else {
                None
            };

            let app = build_router(state);

            let host = cli.host.unwrap_or_else(|| config.server.host.clone());
            let port = cli.port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{host}:{port}").parse()?;

            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("License server listening on http://{}", addr);

            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}
