//! Tests for the remote registry client and the sync jobs, using a mock
//! registry.

#![cfg(all(feature = "server", feature = "sqlite"))]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use licensehub::config::RemoteConfig;
use licensehub::jobs::{migrate_all_licenses, run_remote_sync};
use licensehub::license_key::LicenseKeyConfig;
use licensehub::server::database::{Database, NewLicense};
use licensehub::server::client_api::INVALID_KEY_MESSAGE;
use licensehub::server::handlers::AppState;
use licensehub::server::remote::{RemoteLicense, RemoteRegistry};
use licensehub::server::routes::build_router;

const TOKEN: &str = "registry-secret";
const FINGERPRINT: &str = "0f0e0d0c0b0a09080706050403020100";

async fn setup_db() -> Arc<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");

    let db = Arc::new(Database::SQLite(pool));
    db.migrate().await.expect("failed to migrate");
    db
}

fn remote_config(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        url: server.uri(),
        admin_token: TOKEN.to_string(),
        ..RemoteConfig::default()
    }
}

fn new_license(key: &str) -> NewLicense {
    let now = Utc::now().naive_utc();
    NewLicense {
        license_key: key.to_string(),
        customer_name: "Margaret".to_string(),
        company_name: None,
        email: None,
        phone: None,
        expires_at: now + Duration::days(365),
        max_activations: 1,
        restricted_fingerprint: Some(FINGERPRINT.to_string()),
        notes: None,
        created_by: Some("admin".to_string()),
        generated_at: now,
    }
}

async fn post_json(state: &AppState, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(json!({})))
}

// ============================================================================
// RemoteRegistry
// ============================================================================

#[tokio::test]
async fn push_license_posts_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({"license_key": "WB-PUSH"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_db().await;
    db.insert_license(&new_license("WB-PUSH")).await.unwrap();
    let license = db.get_license("WB-PUSH").await.unwrap().unwrap();

    let registry = RemoteRegistry::new(remote_config(&server));
    let pushed = registry
        .push_license(&RemoteLicense::from(&license))
        .await
        .unwrap();

    assert!(pushed);
}

#[tokio::test]
async fn push_license_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let db = setup_db().await;
    db.insert_license(&new_license("WB-REJECT")).await.unwrap();
    let license = db.get_license("WB-REJECT").await.unwrap().unwrap();

    let registry = RemoteRegistry::new(remote_config(&server));
    assert!(!registry
        .push_license(&RemoteLicense::from(&license))
        .await
        .unwrap());
}

#[tokio::test]
async fn push_is_skipped_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = setup_db().await;
    db.insert_license(&new_license("WB-SKIP")).await.unwrap();
    let license = db.get_license("WB-SKIP").await.unwrap().unwrap();

    let registry = RemoteRegistry::new(RemoteConfig {
        url: server.uri(),
        ..RemoteConfig::default()
    });
    assert!(!registry.sync_enabled());
    assert!(!registry
        .push_license(&RemoteLicense::from(&license))
        .await
        .unwrap());
}

#[tokio::test]
async fn fetch_license_returns_remote_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sys/license/WB-REMOTE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "license_key": "WB-REMOTE",
            "customer_name": "Remote Customer",
            "expires_at": "2099-01-01T00:00:00"
        })))
        .mount(&server)
        .await;

    let registry = RemoteRegistry::new(remote_config(&server));

    let found = registry.fetch_license("WB-REMOTE").await.unwrap();
    assert_eq!(found.customer_name, "Remote Customer");
    assert_eq!(found.max_activations, 1);

    let row = found.to_new_license().unwrap();
    assert_eq!(row.created_by.as_deref(), Some("system_sync"));

    assert!(registry.fetch_license("WB-ABSENT").await.is_none());
}

#[tokio::test]
async fn override_check_reads_answer_and_fails_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .and(query_param("license_key", "WB-OFF"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "allowed": false,
            "message": "Disabled by vendor"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .and(query_param("license_key", "WB-BROKEN"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let registry = RemoteRegistry::new(remote_config(&server));

    let answer = registry.check_override("WB-OFF").await;
    assert!(!answer.allowed);
    assert_eq!(answer.message.as_deref(), Some("Disabled by vendor"));

    assert!(registry.check_override("WB-BROKEN").await.allowed);
    assert!(RemoteRegistry::disabled().check_override("WB-OFF").await.allowed);
}

#[tokio::test]
async fn expiry_and_deletion_are_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/m4st3r/central/licenses/WB-PROP"))
        .and(body_partial_json(json!({"expires_at": "2040-01-01T00:00:00"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/m4st3r/central/licenses/WB-PROP"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let registry = RemoteRegistry::new(remote_config(&server));
    let expiry = chrono::NaiveDate::from_ymd_opt(2040, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    assert!(registry.patch_expiry("WB-PROP", expiry).await);
    assert!(registry.delete_license("WB-PROP").await);
}

#[tokio::test]
async fn rejected_propagation_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/m4st3r/central/licenses/WB-PROP"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/m4st3r/central/licenses/WB-PROP"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let registry = RemoteRegistry::new(remote_config(&server));
    let expiry = chrono::NaiveDate::from_ymd_opt(2040, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    assert!(!registry.patch_expiry("WB-PROP", expiry).await);
    assert!(!registry.delete_license("WB-PROP").await);
}

// ============================================================================
// Sync jobs
// ============================================================================

#[tokio::test]
async fn full_sync_pushes_every_license() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let db = setup_db().await;
    for key in ["WB-S1", "WB-S2", "WB-S3"] {
        db.insert_license(&new_license(key)).await.unwrap();
    }

    let registry = RemoteRegistry::new(remote_config(&server));
    let summary = run_remote_sync(&db, &registry, 1000).await.unwrap();

    assert_eq!(summary.pushed, 3);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn full_sync_respects_batch_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let db = setup_db().await;
    for key in ["WB-L1", "WB-L2", "WB-L3"] {
        db.insert_license(&new_license(key)).await.unwrap();
    }

    let registry = RemoteRegistry::new(remote_config(&server));
    let summary = run_remote_sync(&db, &registry, 2).await.unwrap();
    assert_eq!(summary.attempted(), 2);
}

#[tokio::test]
async fn full_sync_is_a_no_op_when_disabled() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-IDLE")).await.unwrap();

    let summary = run_remote_sync(&db, &RemoteRegistry::disabled(), 1000)
        .await
        .unwrap();
    assert_eq!(summary.attempted(), 0);
}

#[tokio::test]
async fn migration_requires_configured_registry() {
    let db = setup_db().await;
    assert!(migrate_all_licenses(&db, &RemoteRegistry::disabled())
        .await
        .is_err());
}

#[tokio::test]
async fn migration_counts_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .and(body_partial_json(json!({"license_key": "WB-M2"})))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let db = setup_db().await;
    for key in ["WB-M1", "WB-M2", "WB-M3"] {
        db.insert_license(&new_license(key)).await.unwrap();
    }

    let registry = RemoteRegistry::new(remote_config(&server));
    let summary = migrate_all_licenses(&db, &registry).await.unwrap();

    assert_eq!(summary.pushed, 2);
    assert_eq!(summary.failed, 1);
}

// ============================================================================
// Remote-aware endpoints
// ============================================================================

#[tokio::test]
async fn activate_imports_license_from_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sys/license/WB-0A0B0C0D-11223344"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "license_key": "WB-0A0B0C0D-11223344",
            "customer_name": "Imported",
            "expires_at": "2099-01-01T00:00:00",
            "max_activations": 1,
            "restricted_fingerprint": FINGERPRINT
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"allowed": true})))
        .mount(&server)
        .await;

    let db = setup_db().await;
    let state = AppState::new(
        db.clone(),
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );

    let (status, body) = post_json(
        &state,
        "/activate",
        None,
        json!({"license_key": "WB-0A0B0C0D-11223344", "hardware_fingerprint": FINGERPRINT}),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let license = db.get_license("WB-0A0B0C0D-11223344").await.unwrap().unwrap();
    assert_eq!(license.customer_name, "Imported");
    assert_eq!(license.created_by.as_deref(), Some("system_sync"));
}

#[tokio::test]
async fn malformed_key_never_reaches_registry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = AppState::new(
        setup_db().await,
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );

    for key in ["../../admin", "WB-FROM-REMOTE", "wb-0a0b0c0d-11223344"] {
        let (status, body) = post_json(
            &state,
            "/activate",
            None,
            json!({"license_key": key, "hardware_fingerprint": FINGERPRINT}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{key}: {body}");
        assert_eq!(body["detail"], INVALID_KEY_MESSAGE);
    }
}

#[tokio::test]
async fn activate_honours_remote_disable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .and(query_param("license_key", "WB-DEADBEEF-00000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "allowed": false,
            "message": "Subscription cancelled"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_db().await;
    db.insert_license(&new_license("WB-DEADBEEF-00000001"))
        .await
        .unwrap();
    let state = AppState::new(
        db.clone(),
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );

    let (status, body) = post_json(
        &state,
        "/activate",
        None,
        json!({"license_key": "WB-DEADBEEF-00000001", "hardware_fingerprint": FINGERPRINT}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "REMOTE_DISABLED");
    assert_eq!(body["detail"], "Subscription cancelled");
    assert!(db
        .activations_for_license("WB-DEADBEEF-00000001")
        .await
        .unwrap()
        .is_empty());

    let logs = db.validation_logs_for("WB-DEADBEEF-00000001").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, "remote_disabled");
    assert!(logs[0].remote_override);
    assert_eq!(logs[0].message.as_deref(), Some("Subscription cancelled"));
}

#[tokio::test]
async fn activate_fails_open_when_registry_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .and(query_param("license_key", "WB-5000AAAA-00000001"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .and(query_param("license_key", "WB-6A6BA6E0-00000002"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let db = setup_db().await;
    let reachable = AppState::new(
        db.clone(),
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );
    let unreachable = AppState::new(
        db.clone(),
        RemoteRegistry::new(RemoteConfig {
            url: "http://127.0.0.1:9".to_string(),
            override_timeout_secs: 1,
            request_timeout_secs: 1,
            ..RemoteConfig::default()
        }),
        LicenseKeyConfig::default(),
    );

    let cases = [
        (&reachable, "WB-5000AAAA-00000001"),
        (&reachable, "WB-6A6BA6E0-00000002"),
        (&unreachable, "WB-0FF11AE0-00000003"),
    ];
    for (state, key) in cases {
        db.insert_license(&new_license(key)).await.unwrap();

        let (status, body) = post_json(
            state,
            "/activate",
            None,
            json!({"license_key": key, "hardware_fingerprint": FINGERPRINT}),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{key}: {body}");
        assert_eq!(body["message"], "License activated successfully");
        let logs = db.validation_logs_for(key).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "valid");
        assert!(!logs[0].remote_override);
    }
}

#[tokio::test]
async fn validate_honours_remote_disable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sys/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "allowed": false,
            "message": "Subscription cancelled"
        })))
        .mount(&server)
        .await;

    let db = setup_db().await;
    db.insert_license(&new_license("WB-CANCELLED")).await.unwrap();
    db.insert_activation("WB-CANCELLED", FINGERPRINT, None)
        .await
        .unwrap();
    let state = AppState::new(
        db.clone(),
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );

    let (status, body) = post_json(
        &state,
        "/validate",
        None,
        json!({"license_key": "WB-CANCELLED", "hardware_fingerprint": FINGERPRINT}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["is_blocked"], true);
    assert_eq!(body["reason"], "remote_disabled");
    assert_eq!(body["message"], "Subscription cancelled");

    let logs = db.validation_logs_for("WB-CANCELLED").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].remote_override);
}

#[tokio::test]
async fn generate_pushes_new_license() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .and(body_partial_json(json!({"customer_name": "Pushed Customer"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_db().await;
    let state = AppState::new(
        db,
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );

    let (_, login) = post_json(
        &state,
        "/admin/login",
        None,
        json!({"username": "admin", "password": "admin123"}),
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        &state,
        "/admin/generate",
        Some(&token),
        json!({
            "customer_name": "Pushed Customer",
            "expires_at": "2099-01-01",
            "restricted_fingerprint": FINGERPRINT
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn generate_succeeds_when_registry_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/m4st3r/license/sync"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = AppState::new(
        setup_db().await,
        RemoteRegistry::new(remote_config(&server)),
        LicenseKeyConfig::default(),
    );

    let (_, login) = post_json(
        &state,
        "/admin/login",
        None,
        json!({"username": "admin", "password": "admin123"}),
    )
    .await;
    let token = login["token"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &state,
        "/admin/generate",
        Some(&token),
        json!({
            "customer_name": "Offline Customer",
            "expires_at": "2099-01-01",
            "restricted_fingerprint": FINGERPRINT
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
