//! Admin dashboard binary.
//!
//! `licensehub_admin` is the terminal counterpart of the browser admin
//! panel. Without a stored session only `login` (and the dev proxy) can be
//! used; every page command needs a token.

use std::io::{self, BufRead, Write};

use clap::{Parser, Subcommand};

use licensehub::config::get_config;
use licensehub::dashboard::api::GenerateForm;
use licensehub::dashboard::pages::licenses::delete_failure_message;
use licensehub::dashboard::pages::Page;
use licensehub::dashboard::status::LicenseFilter;
use licensehub::dashboard::{
    proxy, AdminApi, DashboardError, DashboardResult, Mount, Nav, SessionGuard, Shell,
    TokenStore, View,
};

#[derive(Parser, Debug)]
#[command(name = "licensehub_admin")]
#[command(about = "License admin panel")]
#[command(version)]
struct Cli {
    /// License server base URL (overrides config)
    #[arg(long, env = "LICENSEHUB_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session token
    Login {
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long, env = "LICENSEHUB_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the session and forget the stored token
    Logout,
    /// Show the dashboard counters
    Overview,
    /// Generate a new license
    Generate {
        #[arg(long)]
        customer_name: String,
        #[arg(long)]
        company_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Expiry date (YYYY-MM-DD or ISO date-time)
        #[arg(long)]
        expires_at: String,
        #[arg(long, default_value_t = 1)]
        max_activations: i64,
        /// Hardware fingerprint the license is bound to
        #[arg(long)]
        restricted_fingerprint: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List licenses
    Licenses {
        /// all, active, expired or blocked
        #[arg(long, default_value = "all")]
        filter: LicenseFilter,
    },
    /// Block a license
    Block {
        license_key: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long, short)]
        yes: bool,
    },
    /// Unblock a license
    Unblock { license_key: String },
    /// Delete a license and all of its activations
    Delete {
        license_key: String,
        #[arg(long, short)]
        yes: bool,
    },
    /// List device activations
    Activations,
    /// Deactivate a device
    Deactivate {
        activation_id: i64,
        #[arg(long, short)]
        yes: bool,
    },
    /// Run the development proxy
    Proxy {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        backend: Option<String>,
    },
}

impl Command {
    fn mount(&self) -> Option<Mount> {
        Some(match self {
            Command::Overview => Mount::Overview,
            Command::Generate { .. } => Mount::Generate(GenerateForm::default()),
            Command::Licenses { filter } => Mount::Licenses(*filter),
            Command::Block { .. } | Command::Unblock { .. } | Command::Delete { .. } => {
                Mount::Licenses(LicenseFilter::All)
            }
            Command::Activations | Command::Deactivate { .. } => Mount::Activations,
            Command::Login { .. } | Command::Logout | Command::Proxy { .. } => return None,
        })
    }
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` declines.
fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn run(cli: Cli) -> DashboardResult<()> {
    let config = get_config().map_err(|e| DashboardError::Config(e.to_string()))?;

    if let Command::Proxy { port, backend } = &cli.command {
        let mut proxy_config = config.proxy.clone();
        if let Some(port) = port {
            proxy_config.listen_port = *port;
        }
        if let Some(backend) = backend {
            proxy_config.backend_origin = backend.clone();
        }
        return proxy::serve(&proxy_config).await;
    }

    let store = TokenStore::secure()?;
    let guard = SessionGuard::new(store.clone());
    let base_url = cli
        .api_url
        .clone()
        .unwrap_or_else(|| config.dashboard.api_base_url.clone());
    let api = AdminApi::new(base_url, store)?;

    let mount = match &cli.command {
        Command::Login { username, password } => {
            let result = api.login(username, password).await?;
            println!("Logged in as {}", result.username);
            return Ok(());
        }
        Command::Logout => {
            api.logout().await?;
            println!("Logged out");
            return Ok(());
        }
        command => command.mount(),
    };
    let Some(mount) = mount else {
        return Ok(());
    };

    if guard.resolve().await? == View::Login {
        return Err(DashboardError::NotLoggedIn);
    }

    print!("{}", Nav { current: mount.route() });
    println!();

    let mut page = Shell::new(&api).mount(mount).await?;

    let outcome = match (cli.command, &mut page) {
        (
            Command::Generate {
                customer_name,
                company_name,
                email,
                phone,
                expires_at,
                max_activations,
                restricted_fingerprint,
                notes,
            },
            Page::Generate(generate),
        ) => {
            generate.form = GenerateForm {
                customer_name,
                company_name,
                email,
                phone,
                expires_at,
                max_activations,
                restricted_fingerprint,
                notes,
            };
            generate.submit(&api).await
        }
        (
            Command::Block {
                license_key,
                message,
                yes,
            },
            Page::Licenses(licenses),
        ) => {
            if yes || confirm("Block this license?") {
                match licenses.block(&api, &license_key, message.as_deref()).await {
                    Ok(result) => {
                        println!("{}\n", result.message);
                        Ok(())
                    }
                    Err(e) => Err(action_failed("Failed to block license", &e)),
                }
            } else {
                Ok(())
            }
        }
        (Command::Unblock { license_key }, Page::Licenses(licenses)) => {
            match licenses.unblock(&api, &license_key).await {
                Ok(result) => {
                    println!("{}\n", result.message);
                    Ok(())
                }
                Err(e) => Err(action_failed("Failed to unblock license", &e)),
            }
        }
        (Command::Delete { license_key, yes }, Page::Licenses(licenses)) => {
            let prompt = format!(
                "Are you sure you want to DELETE license {license_key}? This action cannot be undone and will remove all activations."
            );
            if yes || confirm(&prompt) {
                match licenses.delete(&api, &license_key).await {
                    Ok(_) => {
                        println!("License deleted successfully\n");
                        Ok(())
                    }
                    Err(e) => Err(DashboardError::ActionFailed(delete_failure_message(&e))),
                }
            } else {
                Ok(())
            }
        }
        (Command::Deactivate { activation_id, yes }, Page::Activations(activations)) => {
            if yes || confirm("Deactivate this device?") {
                match activations.deactivate(&api, activation_id).await {
                    Ok(result) => {
                        println!("{}\n", result.message);
                        Ok(())
                    }
                    Err(e) => Err(action_failed("Failed to deactivate device", &e)),
                }
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    };

    print!("{page}");
    outcome
}

fn action_failed(what: &str, err: &DashboardError) -> DashboardError {
    DashboardError::ActionFailed(format!("{what}: {err}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = get_config()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    licensehub::init_tracing(&level);

    if let Err(e) = run(cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
