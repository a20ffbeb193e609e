use std::env;

use serial_test::serial;

use licensehub::config::{HubConfig, RemoteConfig};

const VARS: [&str; 12] = [
    "LICENSEHUB_SERVER_HOST",
    "LICENSEHUB_SERVER_PORT",
    "LICENSEHUB_DATABASE_TYPE",
    "LICENSEHUB_DATABASE_URL",
    "LICENSEHUB_LICENSE_KEY_PREFIX",
    "LICENSEHUB_REMOTE_URL",
    "LICENSEHUB_REMOTE_ADMIN_TOKEN",
    "LICENSEHUB_REMOTE_SYNC_INTERVAL_SECS",
    "LICENSEHUB_LOG_LEVEL",
    "LICENSEHUB_API_URL",
    "LICENSEHUB_PROXY_PORT",
    "LICENSEHUB_PROXY_BACKEND",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn load_without_env_uses_defaults() {
    clear_env();

    let config = HubConfig::load().unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.port, 8001);
    assert_eq!(config.database.db_type, "sqlite");
    assert_eq!(config.license.key_prefix, "WB");
    assert!(!config.remote.is_configured());
    assert_eq!(config.dashboard.api_base_url, "http://localhost:8001");
    assert_eq!(config.proxy.backend_origin, "http://localhost:8001");
}

#[test]
#[serial]
fn env_overrides_server_and_remote() {
    clear_env();
    env::set_var("LICENSEHUB_SERVER_HOST", "0.0.0.0");
    env::set_var("LICENSEHUB_SERVER_PORT", "9100");
    env::set_var("LICENSEHUB_REMOTE_URL", "https://registry.example");
    env::set_var("LICENSEHUB_REMOTE_ADMIN_TOKEN", "token-from-env");
    env::set_var("LICENSEHUB_REMOTE_SYNC_INTERVAL_SECS", "60");

    let config = HubConfig::load().unwrap();
    clear_env();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.remote.url, "https://registry.example");
    assert_eq!(config.remote.sync_interval_secs, 60);
    assert!(config.remote.sync_enabled());
}

#[test]
#[serial]
fn database_url_is_routed_by_scheme() {
    clear_env();
    let defaults = HubConfig::default();

    env::set_var("LICENSEHUB_DATABASE_TYPE", "postgres");
    env::set_var("LICENSEHUB_DATABASE_URL", "postgres://hub@localhost/licenses");
    let config = HubConfig::load().unwrap();
    clear_env();

    assert_eq!(config.database.db_type, "postgres");
    assert_eq!(config.database.postgres_url, "postgres://hub@localhost/licenses");
    assert_eq!(config.database.sqlite_url, defaults.database.sqlite_url);
}

#[test]
#[serial]
fn unparseable_port_falls_back_to_default() {
    clear_env();
    env::set_var("LICENSEHUB_SERVER_PORT", "not-a-port");

    let config = HubConfig::load().unwrap();
    clear_env();

    assert_eq!(config.server.port, 8001);
}

#[test]
#[serial]
fn invalid_env_values_fail_validation() {
    clear_env();
    env::set_var("LICENSEHUB_DATABASE_TYPE", "mysql");
    let config = HubConfig::load().unwrap();
    clear_env();
    assert!(config.validate().is_err());

    env::set_var("LICENSEHUB_LOG_LEVEL", "chatty");
    let config = HubConfig::load().unwrap();
    clear_env();
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn dashboard_and_proxy_overrides() {
    clear_env();
    env::set_var("LICENSEHUB_API_URL", "https://licenses.example");
    env::set_var("LICENSEHUB_PROXY_PORT", "5173");
    env::set_var("LICENSEHUB_PROXY_BACKEND", "http://10.0.0.5:8001");

    let config = HubConfig::load().unwrap();
    clear_env();

    assert_eq!(config.dashboard.api_base_url, "https://licenses.example");
    assert_eq!(config.proxy.listen_port, 5173);
    assert_eq!(config.proxy.backend_origin, "http://10.0.0.5:8001");
}

#[test]
fn remote_without_token_is_fetch_only() {
    let remote = RemoteConfig {
        url: "https://registry.example".to_string(),
        ..RemoteConfig::default()
    };
    assert!(remote.is_configured());
    assert!(!remote.sync_enabled());
}
