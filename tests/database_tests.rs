//! Database layer tests against in-memory SQLite.

#![cfg(all(feature = "server", feature = "sqlite"))]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use licensehub::server::auth::verify_password;
use licensehub::server::database::{ActivationOutcome, Database, NewLicense, ValidationStatus};

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

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn new_license(key: &str, expires_at: NaiveDateTime) -> NewLicense {
    NewLicense {
        license_key: key.to_string(),
        customer_name: "Linus".to_string(),
        company_name: None,
        email: Some("linus@example.com".to_string()),
        phone: None,
        expires_at,
        max_activations: 2,
        restricted_fingerprint: Some("fp".to_string()),
        notes: Some("first customer".to_string()),
        created_by: Some("admin".to_string()),
        generated_at: Utc::now().naive_utc(),
    }
}

#[tokio::test]
async fn migrate_is_idempotent_and_seeds_admin() {
    let db = setup_db().await;
    db.migrate().await.expect("second migrate failed");

    let admin = db.get_admin_user("admin").await.unwrap().unwrap();
    assert!(verify_password("admin123", &admin.password_hash));
    assert!(db.get_admin_user("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn insert_and_fetch_license() {
    let db = setup_db().await;
    let id = db
        .insert_license(&new_license("WB-AAAA0000-BBBB1111", at(2030, 1, 1)))
        .await
        .unwrap();
    assert!(id > 0);

    assert!(db.license_key_exists("WB-AAAA0000-BBBB1111").await.unwrap());
    assert!(!db.license_key_exists("WB-NOPE").await.unwrap());

    let license = db.get_license("WB-AAAA0000-BBBB1111").await.unwrap().unwrap();
    assert_eq!(license.id, id);
    assert_eq!(license.expires_at, at(2030, 1, 1));
    assert_eq!(license.max_activations, 2);
    assert!(!license.is_blocked);
    assert!(license.updated_at.is_none());
}

#[tokio::test]
async fn duplicate_key_is_rejected() {
    let db = setup_db().await;
    let license = new_license("WB-DUP", at(2030, 1, 1));

    db.insert_license(&license).await.unwrap();
    assert!(db.insert_license(&license).await.is_err());
}

#[tokio::test]
async fn import_refreshes_existing_row() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-IMPORT", at(2030, 1, 1)))
        .await
        .unwrap();

    let mut remote = new_license("WB-IMPORT", at(2035, 5, 5));
    remote.customer_name = "Linus T".to_string();
    remote.notes = Some("remote notes".to_string());
    db.import_license(&remote).await.unwrap();

    let license = db.get_license("WB-IMPORT").await.unwrap().unwrap();
    assert_eq!(license.customer_name, "Linus T");
    assert_eq!(license.expires_at, at(2035, 5, 5));
    assert!(license.updated_at.is_some());
    // Only name and expiry are refreshed
    assert_eq!(license.notes.as_deref(), Some("first customer"));
}

#[tokio::test]
async fn import_inserts_missing_row() {
    let db = setup_db().await;
    db.import_license(&new_license("WB-NEW", at(2031, 1, 1)))
        .await
        .unwrap();

    let license = db.get_license("WB-NEW").await.unwrap().unwrap();
    assert_eq!(license.created_by.as_deref(), Some("admin"));
}

#[tokio::test]
async fn list_orders_by_last_touch() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-OLD", at(2030, 1, 1)))
        .await
        .unwrap();
    db.insert_license(&new_license("WB-NEWER", at(2030, 1, 1)))
        .await
        .unwrap();

    // Touching the older row moves it to the front
    db.set_blocked("WB-OLD", true, Some("hold")).await.unwrap();

    let rows = db.list_licenses(10, 0, None).await.unwrap();
    let keys: Vec<&str> = rows.iter().map(|r| r.license.license_key.as_str()).collect();
    assert_eq!(keys, vec!["WB-OLD", "WB-NEWER"]);
}

#[tokio::test]
async fn activation_slots_only_count_active_rows() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-COUNT", at(2030, 1, 1)))
        .await
        .unwrap();

    let first = db.insert_activation("WB-COUNT", "fp-1", None).await.unwrap();
    db.insert_activation("WB-COUNT", "fp-2", Some("Desk"))
        .await
        .unwrap();
    db.deactivate_activation(first).await.unwrap();

    assert!(matches!(
        db.activate_if_allowed("WB-COUNT", "fp-3", None, 2).await.unwrap(),
        ActivationOutcome::Created(_)
    ));
    assert_eq!(
        db.activate_if_allowed("WB-COUNT", "fp-4", None, 2).await.unwrap(),
        ActivationOutcome::LimitReached
    );
    assert_eq!(
        db.activate_if_allowed("WB-COUNT", "fp-2", None, 2).await.unwrap(),
        ActivationOutcome::AlreadyActive
    );
    assert!(db
        .find_active_activation("WB-COUNT", "fp-1")
        .await
        .unwrap()
        .is_none());
    assert!(db
        .find_active_activation("WB-COUNT", "fp-2")
        .await
        .unwrap()
        .is_some());

    let rows = db.list_licenses(10, 0, None).await.unwrap();
    assert_eq!(rows[0].activation_count, 2);

    assert_eq!(db.activations_for_license("WB-COUNT").await.unwrap().len(), 3);
}

#[tokio::test]
async fn touch_last_validated_sets_timestamp() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-TOUCH", at(2030, 1, 1)))
        .await
        .unwrap();
    let id = db.insert_activation("WB-TOUCH", "fp", None).await.unwrap();

    db.touch_last_validated(id).await.unwrap();

    let activation = db
        .find_active_activation("WB-TOUCH", "fp")
        .await
        .unwrap()
        .unwrap();
    assert!(activation.last_validated.is_some());
}

#[tokio::test]
async fn unblock_clears_message() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-BLOCK", at(2030, 1, 1)))
        .await
        .unwrap();

    assert!(db.set_blocked("WB-BLOCK", true, Some("fraud")).await.unwrap());
    assert!(db.set_blocked("WB-BLOCK", false, Some("ignored")).await.unwrap());

    let license = db.get_license("WB-BLOCK").await.unwrap().unwrap();
    assert!(!license.is_blocked);
    assert!(license.block_message.is_none());

    assert!(!db.set_blocked("WB-MISSING", true, None).await.unwrap());
    assert!(!db.update_expiry("WB-MISSING", at(2040, 1, 1)).await.unwrap());
}

#[tokio::test]
async fn delete_unknown_license_keeps_other_data() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-KEEP", at(2030, 1, 1)))
        .await
        .unwrap();
    db.insert_activation("WB-KEEP", "fp", None).await.unwrap();

    assert!(!db.delete_license("WB-GONE").await.unwrap());
    assert_eq!(db.activations_for_license("WB-KEEP").await.unwrap().len(), 1);

    assert!(db.delete_license("WB-KEEP").await.unwrap());
    assert!(db.get_license("WB-KEEP").await.unwrap().is_none());
    assert!(db.activations_for_license("WB-KEEP").await.unwrap().is_empty());
}

#[tokio::test]
async fn validation_log_keeps_order_and_flags() {
    let db = setup_db().await;

    db.log_validation("WB-LOG", "fp", ValidationStatus::RemoteDisabled, true, Some("off"))
        .await
        .unwrap();
    db.log_validation("WB-LOG", "fp", ValidationStatus::Valid, false, None)
        .await
        .unwrap();

    let logs = db.validation_logs_for("WB-LOG").await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, "remote_disabled");
    assert!(logs[0].remote_override);
    assert_eq!(logs[0].message.as_deref(), Some("off"));
    assert_eq!(logs[1].status, "valid");
    assert!(!logs[1].remote_override);
}

#[tokio::test]
async fn stats_are_evaluated_at_given_instant() {
    let db = setup_db().await;
    let now = Utc::now().naive_utc();

    db.insert_license(&new_license("WB-S1", now + Duration::days(10)))
        .await
        .unwrap();
    db.insert_license(&new_license("WB-S2", now - Duration::days(1)))
        .await
        .unwrap();
    db.insert_license(&new_license("WB-S3", now + Duration::days(10)))
        .await
        .unwrap();
    db.set_blocked("WB-S3", true, None).await.unwrap();
    db.insert_activation("WB-S1", "fp", None).await.unwrap();

    let stats = db.stats(now).await.unwrap();
    assert_eq!(stats.total_licenses, 3);
    assert_eq!(stats.active_licenses, 1);
    assert_eq!(stats.expired_licenses, 1);
    assert_eq!(stats.blocked_licenses, 1);
    assert_eq!(stats.total_activations, 1);

    // Twenty days later the first license has lapsed too
    let later = db.stats(now + Duration::days(20)).await.unwrap();
    assert_eq!(later.active_licenses, 0);
    assert_eq!(later.expired_licenses, 3);
}

async fn setup_file_db(dir: &tempfile::TempDir) -> Arc<Database> {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("licenses.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .expect("failed to open file-backed sqlite");

    let db = Arc::new(Database::SQLite(pool));
    db.migrate().await.expect("failed to migrate");
    db
}

#[tokio::test]
async fn concurrent_activations_respect_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let db = setup_file_db(&dir).await;
    db.insert_license(&new_license("WB-RACE", at(2030, 1, 1)))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move {
                db.activate_if_allowed("WB-RACE", &format!("fp-{i}"), None, 2)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            ActivationOutcome::Created(_) => created += 1,
            ActivationOutcome::LimitReached => {}
            ActivationOutcome::AlreadyActive => panic!("fingerprints are distinct"),
        }
    }

    assert_eq!(created, 2);
    assert_eq!(db.activations_for_license("WB-RACE").await.unwrap().len(), 2);
}

#[tokio::test]
async fn one_active_row_per_device() {
    let db = setup_db().await;
    db.insert_license(&new_license("WB-DUP", at(2030, 1, 1)))
        .await
        .unwrap();

    let first = db.insert_activation("WB-DUP", "fp", None).await.unwrap();
    assert!(db.insert_activation("WB-DUP", "fp", None).await.is_err());

    db.deactivate_activation(first).await.unwrap();
    assert!(db.insert_activation("WB-DUP", "fp", None).await.is_ok());
}
